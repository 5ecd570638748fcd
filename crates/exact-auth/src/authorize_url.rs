//! Authorization URL construction
//!
//! The login flow starts at `{base_url}/api/oauth2/auth/` with the client id,
//! `response_type=code` and the registered redirect URI. Callers may override
//! any of these or add extra parameters (e.g. `state`, `force_login`).

use reqwest::Url;

use crate::constants::AUTHORIZE_PATH;
use crate::error::{Error, Result};

/// Extra or overriding query parameters for the authorize URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizeOptions {
    params: Vec<(String, String)>,
}

impl AuthorizeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, replacing any earlier value for the same key.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        set_param(&mut self.params, key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn set_param(params: &mut Vec<(String, String)>, key: String, value: String) {
    match params.iter_mut().find(|(k, _)| *k == key) {
        Some(existing) => existing.1 = value,
        None => params.push((key, value)),
    }
}

/// Build the full authorization URL.
///
/// Defaults come first in a fixed order (`response_type`, `client_id`,
/// `redirect_uri`); overrides replace them in place, new keys are appended.
pub fn build_authorize_url(
    base_url: &str,
    client_id: &str,
    redirect_uri: &str,
    options: &AuthorizeOptions,
) -> Result<Url> {
    let mut params = vec![
        ("response_type".to_owned(), "code".to_owned()),
        ("client_id".to_owned(), client_id.to_owned()),
        ("redirect_uri".to_owned(), redirect_uri.to_owned()),
    ];
    for (key, value) in &options.params {
        set_param(&mut params, key.clone(), value.clone());
    }

    let endpoint = format!("{}{AUTHORIZE_PATH}", base_url.trim_end_matches('/'));
    let mut url =
        Url::parse(&endpoint).map_err(|e| Error::InvalidUrl(format!("{endpoint}: {e}")))?;
    url.query_pairs_mut().extend_pairs(&params);
    Ok(url)
}
