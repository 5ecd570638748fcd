//! Authorization coordinator
//!
//! `authorize` and the probes are read-only with respect to settings;
//! `refresh_authorization` and `auto_authorize` write tokens back.

use std::sync::Arc;
use std::time::Duration;

use common::{Secret, SharedSettings};
use exact_api::{ApiClient, ApiError, HttpApiClient, RequestOptions};
use exact_auth::{
    AuthorizeOptions, BrowserFactory, BrowserLoginFlow, HttpBrowserFactory, TokenExchanger,
    TokenSet, build_authorize_url,
};
use reqwest::Url;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

/// Endpoint used to check that the current access token works.
pub const PROBE_PATH: &str = "/Current/Me";

/// Runs the login, token and probe operations against one settings handle.
pub struct Authorizer {
    settings: SharedSettings,
    api: Arc<dyn ApiClient>,
    browsers: Arc<dyn BrowserFactory>,
    http_client: reqwest::Client,
}

impl Authorizer {
    pub fn new(
        settings: SharedSettings,
        api: Arc<dyn ApiClient>,
        browsers: Arc<dyn BrowserFactory>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            settings,
            api,
            browsers,
            http_client,
        }
    }

    /// Authorizer backed by reqwest for the API, token endpoint and browser,
    /// all using the configured `timeout_secs`.
    pub async fn with_http(settings: SharedSettings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.snapshot().await.timeout_secs);
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| exact_auth::Error::Transport(format!("building HTTP client: {e}")))?;
        let api = Arc::new(HttpApiClient::new(http_client.clone(), settings.clone()));
        let browsers = Arc::new(HttpBrowserFactory::new(timeout));
        Ok(Self::new(settings, api, browsers, http_client))
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    /// Authorization URL for the configured client.
    pub async fn authorize_url(&self, options: &AuthorizeOptions) -> Result<Url> {
        let settings = self.settings.snapshot().await;
        let client_id = required(settings.client_id.as_deref(), "client_id")?;
        let redirect_uri = required(settings.redirect_uri.as_deref(), "redirect_uri")?;
        Ok(build_authorize_url(
            settings.base_url(),
            client_id,
            redirect_uri,
            options,
        )?)
    }

    /// Log in through the browser flow and exchange the code for tokens.
    ///
    /// Settings are not modified; storing the returned tokens is up to the caller.
    pub async fn authorize(
        &self,
        username: &str,
        password: &str,
        options: &AuthorizeOptions,
    ) -> Result<TokenSet> {
        warn!("scripted browser login is deprecated by the provider; prefer an interactive authorization flow");
        let settings = self.settings.snapshot().await;
        let exchanger = TokenExchanger::from_settings(self.http_client.clone(), &settings)?;
        let redirect_uri = exchanger.credentials().redirect_uri.clone();
        let authorize_url = build_authorize_url(
            settings.base_url(),
            &exchanger.credentials().client_id,
            &redirect_uri,
            options,
        )?;

        let mut browser = self
            .browsers
            .launch(&redirect_uri)
            .map_err(|e| exact_auth::Error::Transport(e.to_string()))?;
        let code = BrowserLoginFlow::new(&mut *browser, redirect_uri)
            .run(&authorize_url, username, password)
            .await?;

        let tokens = exchanger.exchange_code(code).await?;
        info!(division = tokens.division.as_deref(), "authorized");
        Ok(tokens)
    }

    /// Exchange `refresh_token` for new tokens and store them in settings.
    ///
    /// The stored refresh token is only replaced when the response carries one.
    pub async fn refresh_authorization(&self, refresh_token: &str) -> Result<TokenSet> {
        warn!("refresh_authorization is deprecated; manage token refresh in the host application");
        let settings = self.settings.snapshot().await;
        let exchanger = TokenExchanger::from_settings(self.http_client.clone(), &settings)?;
        let tokens = exchanger.exchange_refresh_token(refresh_token).await?;

        self.settings
            .update(|s| {
                s.access_token = Some(Secret::new(tokens.access_token.clone()));
                if let Some(refresh) = &tokens.refresh_token {
                    s.refresh_token = Some(Secret::new(refresh.clone()));
                }
            })
            .await;
        info!("stored refreshed tokens");
        Ok(tokens)
    }

    /// `refresh_authorization` with the refresh token currently in settings.
    pub async fn refresh_stored_authorization(&self) -> Result<TokenSet> {
        let refresh_token = self
            .settings
            .snapshot()
            .await
            .refresh_token
            .ok_or_else(|| Error::NotConfigured("refresh_token".into()))?;
        self.refresh_authorization(refresh_token.expose_str()).await
    }

    /// Whether the current access token is accepted by the API.
    ///
    /// Only an authentication rejection yields `false`; timeouts, transport
    /// and server errors are returned as errors.
    pub async fn authorized(&self) -> Result<bool> {
        match self.api.get(PROBE_PATH, RequestOptions::no_division()).await {
            Ok(_) => Ok(true),
            Err(ApiError::AuthenticationRejected(reason)) => {
                error!(%reason, "not yet authorized");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Division of the authenticated user, from the `/Current/Me` probe.
    pub async fn authorize_division(&self) -> Result<String> {
        let response = self
            .api
            .get(PROBE_PATH, RequestOptions::no_division())
            .await?;
        let division = response
            .first()
            .and_then(current_division)
            .ok_or(Error::NoDivisionFound)?;
        debug!(%division, "current division");
        Ok(division)
    }

    /// Configure and authorize entirely from environment variables.
    ///
    /// For quick scripts and tests only. Returns the division written to settings.
    pub async fn auto_authorize(&self) -> Result<String> {
        self.auto_authorize_with_env(|key| std::env::var(key).ok())
            .await
    }

    /// [`Authorizer::auto_authorize`] reading variables through `env`.
    pub async fn auto_authorize_with_env(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<String> {
        warn!("auto_authorize is meant for scripts and tests, not production use");
        let var = |key: &'static str| env(key).ok_or(Error::MissingEnv(key));
        let redirect_uri = var("REDIRECT_URI")?;
        let client_id = var("CLIENT_ID")?;
        let client_secret = var("CLIENT_SECRET")?;
        let username = var("EXACT_USER_NAME")?;
        let password = Secret::new(var("EXACT_PASSWORD")?);

        self.settings
            .update(|s| {
                s.redirect_uri = Some(redirect_uri);
                s.client_id = Some(client_id);
                s.client_secret = Some(Secret::new(client_secret));
            })
            .await;

        let tokens = self
            .authorize(&username, password.expose_str(), &AuthorizeOptions::new())
            .await?;
        self.settings
            .update(|s| {
                s.access_token = Some(Secret::new(tokens.access_token.clone()));
                if let Some(refresh) = &tokens.refresh_token {
                    s.refresh_token = Some(Secret::new(refresh.clone()));
                }
            })
            .await;

        let division = self.authorize_division().await?;
        self.settings
            .update(|s| s.division = Some(division.clone()))
            .await;
        info!(%division, "auto authorization complete");
        Ok(division)
    }
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
    value.ok_or_else(|| Error::NotConfigured(name.to_owned()))
}

/// `current_division` of a `/Current/Me` record, in either casing the API
/// may use, as a string.
fn current_division(record: &Value) -> Option<String> {
    match record
        .get("current_division")
        .or_else(|| record.get("CurrentDivision"))?
    {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
