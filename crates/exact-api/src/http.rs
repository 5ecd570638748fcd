//! reqwest-backed `ApiClient`
//!
//! Reads the base URL, access token and division from `SharedSettings` on
//! every call, so tokens written by a refresh are picked up immediately.

use std::future::Future;
use std::pin::Pin;

use common::SharedSettings;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use tracing::debug;

use crate::{ApiClient, ApiError, ApiResponse, RequestOptions, Result};

/// Authenticated GET client for `{base_url}/api/v1`.
#[derive(Debug, Clone)]
pub struct HttpApiClient {
    client: reqwest::Client,
    settings: SharedSettings,
}

impl HttpApiClient {
    pub fn new(client: reqwest::Client, settings: SharedSettings) -> Self {
        Self { client, settings }
    }

    async fn fetch(&self, path: &str, options: RequestOptions) -> Result<ApiResponse> {
        let settings = self.settings.snapshot().await;
        let access_token = settings.access_token.as_ref().ok_or_else(|| {
            ApiError::AuthenticationRejected("no access token configured".into())
        })?;

        let url = if options.no_division {
            format!("{}/api/v1{path}", settings.base_url())
        } else {
            let division = settings
                .division
                .as_deref()
                .ok_or_else(|| ApiError::NotConfigured("division".into()))?;
            format!("{}/api/v1/{division}{path}", settings.base_url())
        };
        debug!(%url, "api GET");

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token.expose_str())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::Timeout(format!("GET {path}: {e}"))
                } else {
                    ApiError::Transport(format!("GET {path}: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(classify_status(status, body));
        }

        let body = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ApiError::Malformed(format!("GET {path}: {e}")))?;
        Ok(ApiResponse::from_json(body))
    }
}

/// Map a non-success status to an error.
///
/// Exact answers an unauthorized call with 401, and with 400 when the token
/// is malformed or belongs to another client; both mean "not authorized".
fn classify_status(status: StatusCode, body: String) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::BAD_REQUEST => {
            ApiError::AuthenticationRejected(format!("{status}: {body}"))
        }
        _ => ApiError::Status {
            status: status.as_u16(),
            body,
        },
    }
}

impl ApiClient for HttpApiClient {
    fn get<'a>(
        &'a self,
        path: &'a str,
        options: RequestOptions,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>> {
        Box::pin(self.fetch(path, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Secret, Settings};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings_for(server: &MockServer, token: Option<&str>) -> SharedSettings {
        SharedSettings::new(Settings {
            base_url: server.uri(),
            access_token: token.map(Secret::from),
            division: Some("17".into()),
            ..Settings::default()
        })
    }

    #[tokio::test]
    async fn current_me_without_division() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/Current/Me"))
            .and(header("authorization", "Bearer at_live"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "d": {"results": [{"CurrentDivision": 17}]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpApiClient::new(reqwest::Client::new(), settings_for(&server, Some("at_live")));
        let response = client
            .get("/Current/Me", RequestOptions::no_division())
            .await
            .unwrap();
        assert_eq!(response.first().unwrap()["CurrentDivision"], 17);
    }

    #[tokio::test]
    async fn division_scoped_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/17/crm/Accounts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"d": {"results": []}})))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpApiClient::new(reqwest::Client::new(), settings_for(&server, Some("at")));
        let response = client
            .get("/crm/Accounts", RequestOptions::default())
            .await
            .unwrap();
        assert!(response.is_empty());
    }

    #[tokio::test]
    async fn unauthorized_is_authentication_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
            .mount(&server)
            .await;

        let client = HttpApiClient::new(reqwest::Client::new(), settings_for(&server, Some("at")));
        let err = client
            .get("/Current/Me", RequestOptions::no_division())
            .await
            .unwrap_err();
        assert!(
            matches!(err, ApiError::AuthenticationRejected(ref msg) if msg.contains("token expired")),
            "got: {err:?}"
        );
    }

    #[tokio::test]
    async fn missing_token_is_authentication_rejected() {
        let server = MockServer::start().await;
        let client = HttpApiClient::new(reqwest::Client::new(), settings_for(&server, None));
        let err = client
            .get("/Current/Me", RequestOptions::no_division())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::AuthenticationRejected(_)));
    }

    #[tokio::test]
    async fn server_error_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let client = HttpApiClient::new(reqwest::Client::new(), settings_for(&server, Some("at")));
        let err = client
            .get("/Current/Me", RequestOptions::no_division())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 503, .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn slow_server_is_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"results": []}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        let client = HttpApiClient::new(http, settings_for(&server, Some("at")));
        let err = client
            .get("/Current/Me", RequestOptions::no_division())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Timeout(_)), "got: {err:?}");
    }
}
