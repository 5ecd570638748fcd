//! Exact Online REST API surface used by the authorization flow
//!
//! Defines the `ApiClient` trait that decouples the authorizer from the
//! general-purpose HTTP layer. `HttpApiClient` is the reqwest-backed
//! implementation; tests substitute in-memory fakes.
//!
//! Only the pieces the authorization probe needs live here: a GET with
//! per-request options, a result-list response wrapper, and an error type
//! that distinguishes an authentication rejection from everything else.

pub mod http;

pub use http::HttpApiClient;

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

/// Per-request switches for `ApiClient::get`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Call the endpoint outside any division scope (e.g. `/Current/Me`).
    pub no_division: bool,
}

impl RequestOptions {
    pub fn no_division() -> Self {
        Self { no_division: true }
    }
}

/// Result records from an API call.
///
/// Exact wraps OData results as `{"d": {"results": [...]}}`, single entities
/// as `{"d": {...}}`. Both shapes, plus a plain `{"results": [...]}` object
/// and a bare array, normalize to a list of records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiResponse {
    results: Vec<Value>,
}

impl ApiResponse {
    pub fn new(results: Vec<Value>) -> Self {
        Self { results }
    }

    pub fn from_json(body: Value) -> Self {
        let body = match body {
            Value::Object(mut map) if map.contains_key("d") => map.remove("d").unwrap_or_default(),
            other => other,
        };
        let results = match body {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("results") {
                Some(Value::Array(items)) => items,
                Some(other) => vec![other],
                None => vec![Value::Object(map)],
            },
            Value::Null => Vec::new(),
            other => vec![other],
        };
        Self { results }
    }

    pub fn results(&self) -> &[Value] {
        &self.results
    }

    pub fn first(&self) -> Option<&Value> {
        self.results.first()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Errors from API calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The access token is missing, expired or revoked.
    #[error("authentication rejected: {0}")]
    AuthenticationRejected(String),

    #[error("API request timed out: {0}")]
    Timeout(String),

    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid API response: {0}")]
    Malformed(String),

    #[error("not configured: {0}")]
    NotConfigured(String),
}

/// Result alias for API calls.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Authenticated access to the Exact Online REST API.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn ApiClient>`).
pub trait ApiClient: Send + Sync {
    /// GET `path` (relative to `/api/v1`, e.g. `/Current/Me`).
    fn get<'a>(
        &'a self,
        path: &'a str,
        options: RequestOptions,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>>;
}
