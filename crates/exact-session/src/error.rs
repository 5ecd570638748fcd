//! Error types for authorizer operations

/// Errors from the authorizer.
///
/// Auth and API errors are wrapped transparently so callers can still match
/// on the original kind (e.g. `ApiError::Timeout`).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Auth(#[from] exact_auth::Error),

    #[error(transparent)]
    Api(#[from] exact_api::ApiError),

    #[error("no division found in /Current/Me response")]
    NoDivisionFound,

    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("not configured: {0}")]
    NotConfigured(String),
}

/// Result alias for authorizer operations.
pub type Result<T> = std::result::Result<T, Error>;
