//! Exact Online login CLI
//!
//! Drives the authorizer from the command line:
//! 1. Loads settings (`--config` > `EXACT_CONFIG` > `exact-login.toml`, env overlays)
//! 2. Runs one command against the Exact Online OAuth2 and REST endpoints
//! 3. Prints tokens or the division on stdout for the caller to persist
//!
//! Logs go to stderr as JSON.

mod cli;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use common::{Secret, Settings, SharedSettings};
use exact_auth::AuthorizeOptions;
use exact_session::Authorizer;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let args = Cli::parse();

    let config_path = Settings::resolve_path(args.config.as_deref());
    info!(path = %config_path.display(), command = ?args.command, "loading settings");
    let mut settings = Settings::load(&config_path)
        .with_context(|| format!("failed to load settings from {}", config_path.display()))?;
    if let Ok(token) = std::env::var("EXACT_ACCESS_TOKEN") {
        settings.access_token = Some(Secret::new(token));
    }
    if let Ok(token) = std::env::var("EXACT_REFRESH_TOKEN") {
        settings.refresh_token = Some(Secret::new(token));
    }

    let settings = SharedSettings::new(settings);
    let authorizer = Authorizer::with_http(settings.clone())
        .await
        .context("failed to build HTTP clients")?;

    run(args.command, &authorizer).await
}

/// Execute one command. Only `status` reports failure through the exit code;
/// everything else fails with an error.
async fn run(command: Command, authorizer: &Authorizer) -> Result<ExitCode> {
    match command {
        Command::Url => {
            let url = authorizer.authorize_url(&AuthorizeOptions::new()).await?;
            println!("{url}");
        }
        Command::Authorize => {
            let username = require_env("EXACT_USER_NAME")?;
            let password = Secret::new(require_env("EXACT_PASSWORD")?);
            let tokens = authorizer
                .authorize(&username, password.expose_str(), &AuthorizeOptions::new())
                .await
                .context("authorization failed")?;
            println!("{}", serde_json::to_string_pretty(&tokens)?);
        }
        Command::Refresh => {
            let tokens = authorizer
                .refresh_stored_authorization()
                .await
                .context("token refresh failed (is EXACT_REFRESH_TOKEN set?)")?;
            println!("{}", serde_json::to_string_pretty(&tokens)?);
        }
        Command::Status => {
            let authorized = authorizer.authorized().await.context("status probe failed")?;
            println!("{}", if authorized { "authorized" } else { "not authorized" });
            if !authorized {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Division => {
            let division = authorizer
                .authorize_division()
                .await
                .context("could not read current division")?;
            println!("{division}");
        }
        Command::Auto => {
            let division = authorizer
                .auto_authorize()
                .await
                .context("automatic authorization failed")?;
            let settings = authorizer.settings().snapshot().await;
            let tokens = serde_json::json!({
                "division": division,
                "access_token": settings.access_token.as_ref().map(|t| t.expose_str().to_owned()),
                "refresh_token": settings.refresh_token.as_ref().map(|t| t.expose_str().to_owned()),
            });
            println!("{}", serde_json::to_string_pretty(&tokens)?);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("{key} must be set"))
}
