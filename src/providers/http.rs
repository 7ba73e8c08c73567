//! Shared HTTP client for upstream provider calls.
//! Uses reqwest-middleware for retries with exponential backoff.

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde_json::json;
use std::time::Duration;

use crate::errors::AppError;

pub struct UpstreamClient {
    client: ClientWithMiddleware,
}

impl Default for UpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}

impl UpstreamClient {
    pub fn new() -> Self {
        let reqwest_client = reqwest::Client::builder()
            .use_rustls_tls()
            .pool_max_idle_per_host(16)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("failed to build HTTP client");

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);

        let client = ClientBuilder::new(reqwest_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self { client }
    }

    pub fn request(&self, method: reqwest::Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Common upstream shape: send, translate non-2xx into a sanitized
    /// failure (detail logged, never forwarded), normalize no-content
    /// responses, parse JSON otherwise.
    pub async fn send_json(
        &self,
        provider: &str,
        builder: RequestBuilder,
    ) -> Result<serde_json::Value, AppError> {
        let resp = builder.send().await.map_err(|e| {
            tracing::warn!(provider, "upstream request failed after retries: {}", e);
            AppError::Upstream(format!("{}: {}", provider, e))
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::NO_CONTENT || status == reqwest::StatusCode::ACCEPTED {
            return Ok(json!({ "ok": true }));
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(provider, %status, body = %body, "upstream returned error status");
            return Err(AppError::Upstream(format!(
                "{} returned {}: {}",
                provider, status, body
            )));
        }

        // Some creation endpoints reply 201 with an empty body.
        let body = resp.bytes().await.map_err(|e| {
            AppError::Upstream(format!("{}: failed to read response body: {}", provider, e))
        })?;
        if body.is_empty() {
            return Ok(json!({ "ok": true }));
        }

        serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!(provider, "upstream returned non-JSON body: {}", e);
            AppError::Upstream(format!("{}: invalid JSON response", provider))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn no_content_normalizes_to_ok_marker() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/things/abc"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = UpstreamClient::new();
        let url = format!("{}/v1/things/abc", server.uri());
        let out = client
            .send_json("test", client.request(reqwest::Method::DELETE, &url))
            .await
            .unwrap();
        assert_eq!(out, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn error_status_becomes_sanitized_upstream_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/fail"))
            .respond_with(ResponseTemplate::new(403).set_body_string("internal quota detail"))
            .mount(&server)
            .await;

        let client = UpstreamClient::new();
        let url = format!("{}/v1/fail", server.uri());
        let err = client
            .send_json("test", client.request(reqwest::Method::GET, &url))
            .await
            .unwrap_err();

        // Detail is preserved internally for the audit trail...
        assert!(err.to_string().contains("quota detail"));
        // ...but the caller-visible message is generic.
        assert_eq!(err.caller_message(), "upstream request failed");
    }
}
