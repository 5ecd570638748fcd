//! OAuth token exchange and refresh
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (after browser login + consent)
//! 2. Refresh token exchange
//!
//! Both POST a form-encoded body to `{base_url}/api/oauth2/token` and carry
//! the client secret. Neither retries: a consumed code or rotated refresh
//! token cannot be replayed.

use common::{Secret, Settings};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::{debug, info, warn};

use crate::constants::TOKEN_PATH;
use crate::error::{Error, Result};
use crate::token::{AuthorizationCode, TokenResponse, TokenSet};

/// Registered OAuth client.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub redirect_uri: String,
}

impl Credentials {
    /// Take the client credentials from settings; all three must be set.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client_id = settings
            .client_id
            .clone()
            .ok_or_else(|| Error::Config("client_id".into()))?;
        let client_secret = settings
            .client_secret
            .clone()
            .ok_or_else(|| Error::Config("client_secret".into()))?;
        let redirect_uri = settings
            .redirect_uri
            .clone()
            .ok_or_else(|| Error::Config("redirect_uri".into()))?;
        Ok(Self {
            client_id,
            client_secret,
            redirect_uri,
        })
    }
}

/// Client for the token endpoint.
#[derive(Debug, Clone)]
pub struct TokenExchanger {
    client: reqwest::Client,
    token_url: String,
    credentials: Credentials,
}

impl TokenExchanger {
    pub fn new(client: reqwest::Client, base_url: &str, credentials: Credentials) -> Self {
        Self {
            client,
            token_url: format!("{}{TOKEN_PATH}", base_url.trim_end_matches('/')),
            credentials,
        }
    }

    pub fn from_settings(client: reqwest::Client, settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            client,
            settings.base_url(),
            Credentials::from_settings(settings)?,
        ))
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Exchange an authorization code for tokens. The code is consumed.
    pub async fn exchange_code(&self, code: AuthorizationCode) -> Result<TokenSet> {
        let request = self
            .client
            .post(&self.token_url)
            .header(ACCEPT, "application/json")
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.expose_str()),
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", self.credentials.redirect_uri.as_str()),
            ]);
        self.send("authorization_code", request).await
    }

    /// Exchange a refresh token for a new token set.
    pub async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenSet> {
        let request = self
            .client
            .post(&self.token_url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.expose_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ]);
        self.send("refresh_token", request).await
    }

    async fn send(&self, grant_type: &str, request: reqwest::RequestBuilder) -> Result<TokenSet> {
        debug!(grant_type, url = %self.token_url, "token request");
        let response = request
            .send()
            .await
            .map_err(|e| Error::Transport(format!("{grant_type} request failed: {e}")))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("reading {grant_type} response: {e}")))?;
        let token_response = TokenResponse::new(status.as_u16(), body.to_vec());

        if !status.is_success() {
            warn!(
                grant_type,
                status = status.as_u16(),
                error = token_response.error_code().as_deref().unwrap_or("<none>"),
                body_len = token_response.body().len(),
                "token endpoint rejected request"
            );
            return Err(Error::TokenEndpoint {
                status: status.as_u16(),
                response: token_response,
            });
        }

        let tokens = token_response.token_set()?;
        info!(
            grant_type,
            refresh_token = tokens.refresh_token.is_some(),
            "token exchange succeeded"
        );
        Ok(tokens)
    }
}
