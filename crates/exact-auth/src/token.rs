//! Token endpoint response handling
//!
//! `TokenResponse` keeps the raw body and parses it on first access, so an
//! error response whose body is not JSON can still be carried around (and
//! logged by status) without failing up front. Missing keys are reported as
//! `None`; only `token_set()` insists on an access token.

use std::fmt;
use std::sync::OnceLock;

use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Authorization code taken from the redirect after login and consent.
///
/// Not `Clone`: `TokenExchanger::exchange_code` takes it by value, so a code
/// can only ever be exchanged once.
pub struct AuthorizationCode(String);

impl AuthorizationCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthorizationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthorizationCode([REDACTED])")
    }
}

/// Tokens extracted from a successful token endpoint response.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Provider tenant the token was issued for, when the endpoint reports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub division: Option<String>,
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("division", &self.division)
            .finish()
    }
}

/// Raw token endpoint response with lazily parsed JSON accessors.
pub struct TokenResponse {
    status: u16,
    body: Vec<u8>,
    parsed: OnceLock<std::result::Result<Value, String>>,
}

impl TokenResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
            parsed: OnceLock::new(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Parsed body. Parses once; later calls reuse the first outcome.
    pub fn json(&self) -> Result<&Value> {
        self.parsed
            .get_or_init(|| serde_json::from_slice(&self.body).map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| Error::MalformedResponse(e.clone()))
    }

    pub fn access_token(&self) -> Result<Option<String>> {
        self.string_field("access_token")
    }

    pub fn refresh_token(&self) -> Result<Option<String>> {
        self.string_field("refresh_token")
    }

    /// Division id; the endpoint may send it as a string or a number.
    pub fn division(&self) -> Result<Option<String>> {
        self.string_field("division")
    }

    /// OAuth `error` code of a failed exchange, if the body carries one.
    pub fn error_code(&self) -> Option<String> {
        self.string_field("error").ok().flatten()
    }

    /// Convert into a `TokenSet`, requiring an access token.
    pub fn token_set(&self) -> Result<TokenSet> {
        let access_token = self
            .access_token()?
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::MalformedResponse("missing access_token".into()))?;
        Ok(TokenSet {
            access_token,
            refresh_token: self.refresh_token()?,
            division: self.division()?,
        })
    }

    fn string_field(&self, key: &str) -> Result<Option<String>> {
        Ok(match self.json()?.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("status", &self.status)
            .field("body_len", &self.body.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_return_values_unchanged() {
        let response = TokenResponse::new(
            200,
            r#"{"access_token":"at_abc","refresh_token":"rt_def","division":"1234","expires_in":"600"}"#,
        );
        assert_eq!(response.access_token().unwrap().as_deref(), Some("at_abc"));
        assert_eq!(response.refresh_token().unwrap().as_deref(), Some("rt_def"));
        assert_eq!(response.division().unwrap().as_deref(), Some("1234"));
    }

    #[test]
    fn numeric_division_is_rendered_as_string() {
        let response = TokenResponse::new(200, r#"{"access_token":"at","division":42}"#);
        assert_eq!(response.division().unwrap().as_deref(), Some("42"));
    }

    #[test]
    fn missing_keys_are_absent_not_errors() {
        let response = TokenResponse::new(200, r#"{"access_token":"at_only"}"#);
        assert_eq!(response.refresh_token().unwrap(), None);
        assert_eq!(response.division().unwrap(), None);
    }

    #[test]
    fn invalid_json_fails_every_accessor() {
        let response = TokenResponse::new(502, "<html>Bad Gateway</html>");
        assert!(matches!(
            response.access_token(),
            Err(Error::MalformedResponse(_))
        ));
        assert!(matches!(
            response.refresh_token(),
            Err(Error::MalformedResponse(_))
        ));
        assert!(matches!(response.division(), Err(Error::MalformedResponse(_))));
        assert!(response.error_code().is_none());
        assert_eq!(response.status(), 502);
    }

    #[test]
    fn token_set_requires_access_token() {
        let response = TokenResponse::new(200, r#"{"refresh_token":"rt"}"#);
        let err = response.token_set().unwrap_err();
        assert!(err.to_string().contains("missing access_token"), "got: {err}");
    }

    #[test]
    fn token_set_collects_fields() {
        let response = TokenResponse::new(
            200,
            r#"{"access_token":"at","refresh_token":"rt","division":7}"#,
        );
        let tokens = response.token_set().unwrap();
        assert_eq!(
            tokens,
            TokenSet {
                access_token: "at".into(),
                refresh_token: Some("rt".into()),
                division: Some("7".into()),
            }
        );
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let tokens = TokenSet {
            access_token: "at_secret".into(),
            refresh_token: Some("rt_secret".into()),
            division: None,
        };
        let debug = format!("{tokens:?}");
        assert!(!debug.contains("at_secret") && !debug.contains("rt_secret"));
        assert!(!format!("{:?}", AuthorizationCode::new("XYZ789")).contains("XYZ789"));
    }

    #[test]
    fn token_set_serializes_without_empty_fields() {
        let tokens = TokenSet {
            access_token: "at".into(),
            refresh_token: None,
            division: None,
        };
        assert_eq!(serde_json::to_string(&tokens).unwrap(), r#"{"access_token":"at"}"#);
    }
}
