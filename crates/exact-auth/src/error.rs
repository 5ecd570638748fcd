//! Error types for the authorization flow

use crate::token::TokenResponse;

/// Errors from login, consent and token operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Transport(String),

    /// Non-2xx from the token endpoint. The body is kept for inspection.
    #[error("token endpoint returned {status}")]
    TokenEndpoint { status: u16, response: TokenResponse },

    #[error("malformed token response: {0}")]
    MalformedResponse(String),

    #[error("login form not found: {0}")]
    LoginFormNotFound(String),

    #[error("consent form not found: {0}")]
    ConsentFormNotFound(String),

    #[error("authorization code not found in redirect: {0}")]
    CodeNotFound(String),

    #[error("missing configuration: {0}")]
    Config(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_endpoint_error_keeps_body() {
        let err = Error::TokenEndpoint {
            status: 400,
            response: TokenResponse::new(400, r#"{"error":"invalid_grant"}"#),
        };
        assert_eq!(err.to_string(), "token endpoint returned 400");
        match err {
            Error::TokenEndpoint { response, .. } => {
                assert_eq!(response.error_code().as_deref(), Some("invalid_grant"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
