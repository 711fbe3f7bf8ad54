//! HTTP client for the database control plane REST API

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// Maximum length of response body to log
const MAX_LOG_BODY_LENGTH: usize = 200;

const ACCEPT: &str = "application/vnd.atlas.2023-02-01+json";

fn sanitize_for_log(body: &str) -> String {
    let total = body.chars().count();
    let truncated: String = if total > MAX_LOG_BODY_LENGTH {
        format!(
            "{}... [truncated, {} chars total]",
            body.chars().take(MAX_LOG_BODY_LENGTH).collect::<String>(),
            total
        )
    } else {
        body.to_string()
    };
    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Error envelope returned by the control plane
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiErrorBody {
    detail: Option<String>,
    error_code: Option<String>,
    reason: Option<String>,
}

fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(ApiErrorBody {
            detail: Some(detail),
            error_code,
            ..
        }) => match error_code {
            Some(code) => format!("{} ({})", detail, code),
            None => detail,
        },
        Ok(ApiErrorBody { reason: Some(reason), .. }) => reason,
        _ => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    }
}

/// Thin JSON client that keeps the HTTP status on every failure.
#[derive(Clone)]
pub struct ControlPlaneClient {
    client: Client,
    base_url: String,
    token: String,
}

impl ControlPlaneClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> GatewayResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("cloudstep/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("{} {}", method, url);
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, ACCEPT)
    }

    async fn send(&self, request: RequestBuilder) -> GatewayResult<String> {
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            if status == reqwest::StatusCode::NOT_FOUND {
                tracing::debug!("API returned 404 - {}", sanitize_for_log(&body));
            } else {
                tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            }
            return Err(GatewayError::api(status.as_u16(), error_message(status, &body)));
        }

        Ok(body)
    }

    fn decode<T: DeserializeOwned>(body: &str) -> GatewayResult<T> {
        // Empty bodies decode as JSON null so `()` and `Option<_>` targets work
        let body = if body.trim().is_empty() { "null" } else { body };
        serde_json::from_str(body).map_err(|e| GatewayError::Decode(e.to_string()))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> GatewayResult<T> {
        let body = self.send(self.request(Method::GET, path)).await?;
        Self::decode(&body)
    }

    /// GET with query parameters
    pub async fn get_with_query<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> GatewayResult<T> {
        let body = self.send(self.request(Method::GET, path).query(query)).await?;
        Self::decode(&body)
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, payload: &B) -> GatewayResult<T> {
        let body = self.send(self.request(Method::POST, path).json(payload)).await?;
        Self::decode(&body)
    }

    /// POST without a body, for action endpoints such as `:start`
    pub async fn post_empty(&self, path: &str) -> GatewayResult<()> {
        self.send(self.request(Method::POST, path)).await?;
        Ok(())
    }

    pub async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, payload: &B) -> GatewayResult<T> {
        let body = self.send(self.request(Method::PATCH, path).json(payload)).await?;
        Self::decode(&body)
    }

    pub async fn delete(&self, path: &str) -> GatewayResult<()> {
        self.send(self.request(Method::DELETE, path)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_prefers_detail() {
        let body = r#"{"detail": "Cluster orders does not exist.", "errorCode": "CLUSTER_NOT_FOUND", "error": 404}"#;
        assert_eq!(
            error_message(reqwest::StatusCode::NOT_FOUND, body),
            "Cluster orders does not exist. (CLUSTER_NOT_FOUND)"
        );
    }

    #[test]
    fn test_error_message_falls_back_to_status() {
        assert_eq!(
            error_message(reqwest::StatusCode::BAD_GATEWAY, "<html>oops</html>"),
            "Bad Gateway"
        );
    }

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let long = "x".repeat(500);
        let logged = sanitize_for_log(&long);
        assert!(logged.contains("[truncated, 500 chars total]"));
    }
}
