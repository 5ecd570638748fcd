//! Client settings and their shared, mutable handle
//!
//! Precedence: env vars > TOML file > defaults. The client secret is read
//! from `CLIENT_SECRET` or `client_secret_file`, never from the TOML itself.
//! Tokens are never read from the file; they are written at runtime by the
//! authorization flow.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{Error, Result, Secret};

/// Default Exact Online host (Dutch region)
pub const DEFAULT_BASE_URL: &str = "https://start.exactonline.nl";

const DEFAULT_CONFIG_FILE: &str = "exact-login.toml";

/// Client configuration plus the tokens obtained at runtime.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(skip)]
    pub access_token: Option<Secret<String>>,
    #[serde(skip)]
    pub refresh_token: Option<Secret<String>>,
    /// Tenant the business API calls are scoped to
    #[serde(default)]
    pub division: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_owned()
}

fn default_timeout() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            client_id: None,
            client_secret: None,
            client_secret_file: None,
            redirect_uri: None,
            access_token: None,
            refresh_token: None,
            division: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file, then overlay the process environment.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Like [`Settings::load`], reading env vars through `env` instead of the
    /// process environment.
    ///
    /// A missing file is only tolerated when it is the default path; an
    /// explicitly named file must exist.
    pub fn load_with_env(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let settings: Settings = toml::from_str(&contents)?;
            info!(path = %path.display(), "loaded settings file");
            settings
        } else if path == Path::new(DEFAULT_CONFIG_FILE) {
            debug!(path = %path.display(), "no settings file, using defaults");
            Settings::default()
        } else {
            return Err(Error::Config(format!(
                "settings file {} does not exist",
                path.display()
            )));
        };

        settings.apply_env(env)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Overlay environment values. `CLIENT_SECRET` wins over `client_secret_file`.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(base_url) = env("EXACT_BASE_URL") {
            self.base_url = base_url;
        }
        if let Some(client_id) = env("CLIENT_ID") {
            self.client_id = Some(client_id);
        }
        if let Some(redirect_uri) = env("REDIRECT_URI") {
            self.redirect_uri = Some(redirect_uri);
        }
        if let Some(division) = env("EXACT_DIVISION") {
            self.division = Some(division);
        }

        if let Some(secret) = env("CLIENT_SECRET") {
            self.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = self.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                self.client_secret = Some(Secret::new(secret));
            }
        }
        Ok(())
    }

    /// Reject values no request could succeed with.
    pub fn validate(&self) -> Result<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.base_url
            )));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be greater than 0".into()));
        }
        Ok(())
    }

    /// `base_url` without a trailing slash, ready for path concatenation.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Resolve settings file path from CLI arg or EXACT_CONFIG env var.
    pub fn resolve_path(cli_path: Option<&Path>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("EXACT_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }
}

/// Settings shared between the host application and the authorizer.
///
/// Cloning the handle shares the same underlying settings. Reads take a
/// snapshot so no lock is held across network calls.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<Settings>>,
}

impl SharedSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Clone of the current settings.
    pub async fn snapshot(&self) -> Settings {
        self.inner.read().await.clone()
    }

    /// Mutate the settings in place under the write lock.
    pub async fn update<R>(&self, f: impl FnOnce(&mut Settings) -> R) -> R {
        let mut settings = self.inner.write().await;
        f(&mut settings)
    }
}

impl From<Settings> for SharedSettings {
    fn from(settings: Settings) -> Self {
        Self::new(settings)
    }
}
