//! Google Search Console adapter.
//!
//! Site URLs appear as path segments in the API, percent-encoded as a
//! single segment rather than spliced in raw.

use reqwest::Method;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::providers::http::UpstreamClient;

const DEFAULT_BASE: &str = "https://www.googleapis.com/webmasters/v3";

pub struct SearchConsoleClient<'a> {
    http: &'a UpstreamClient,
    base: String,
    token: String,
}

impl<'a> SearchConsoleClient<'a> {
    pub fn new(http: &'a UpstreamClient, token: String) -> Self {
        Self::with_base(http, token, DEFAULT_BASE.into())
    }

    pub fn with_base(http: &'a UpstreamClient, token: String, base: String) -> Self {
        Self { http, base, token }
    }

    pub async fn list_sites(&self) -> Result<Value, AppError> {
        let url = format!("{}/sites", self.base);
        self.http
            .send_json(
                "search_console",
                self.http.request(Method::GET, &url).bearer_auth(&self.token),
            )
            .await
    }

    pub async fn list_sitemaps(&self, site_url: &str) -> Result<Value, AppError> {
        let site = encode_site_url(site_url)?;
        let url = format!("{}/sites/{}/sitemaps", self.base, site);
        self.http
            .send_json(
                "search_console",
                self.http.request(Method::GET, &url).bearer_auth(&self.token),
            )
            .await
    }

    pub async fn query_analytics(
        &self,
        site_url: &str,
        start_date: &str,
        end_date: &str,
        dimensions: &[String],
        row_limit: u32,
    ) -> Result<Value, AppError> {
        let site = encode_site_url(site_url)?;
        for d in dimensions {
            if !matches!(d.as_str(), "query" | "page" | "country" | "device" | "date") {
                return Err(AppError::validation(
                    "dimensions",
                    "each must be one of query, page, country, device, date",
                ));
            }
        }
        let url = format!("{}/sites/{}/searchAnalytics/query", self.base, site);
        self.http
            .send_json(
                "search_console",
                self.http
                    .request(Method::POST, &url)
                    .bearer_auth(&self.token)
                    .json(&json!({
                        "startDate": start_date,
                        "endDate": end_date,
                        "dimensions": dimensions,
                        "rowLimit": row_limit.min(25_000),
                    })),
            )
            .await
    }
}

/// Percent-encode a property URL into one opaque path segment. Stops
/// raw `/` or `..` from restructuring the request path.
fn encode_site_url(site_url: &str) -> Result<String, AppError> {
    if site_url.is_empty()
        || !(site_url.starts_with("http://")
            || site_url.starts_with("https://")
            || site_url.starts_with("sc-domain:"))
    {
        return Err(AppError::validation(
            "site_url",
            "must start with http://, https:// or sc-domain:",
        ));
    }
    Ok(urlencoding::encode(site_url).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn site_url_is_one_opaque_segment() {
        let encoded = encode_site_url("https://example.com/").unwrap();
        assert_eq!(encoded, "https%3A%2F%2Fexample.com%2F");
        assert!(!encoded.contains('/'));
    }

    #[test]
    fn bare_strings_are_not_site_urls() {
        assert!(encode_site_url("example.com").is_err());
        assert!(encode_site_url("").is_err());
        assert!(encode_site_url("sc-domain:example.com").is_ok());
    }

    #[tokio::test]
    async fn query_analytics_posts_the_report_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(
                "/sites/https%3A%2F%2Fexample.com%2F/searchAnalytics/query",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "rows": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let http = UpstreamClient::new();
        let client = SearchConsoleClient::with_base(&http, "tok".into(), server.uri());
        let out = client
            .query_analytics(
                "https://example.com/",
                "2026-01-01",
                "2026-01-31",
                &["query".into()],
                100,
            )
            .await
            .unwrap();
        assert_eq!(out["rows"], json!([]));
    }

    #[tokio::test]
    async fn unknown_dimension_is_rejected() {
        let http = UpstreamClient::new();
        let client = SearchConsoleClient::with_base(&http, "tok".into(), "http://127.0.0.1:1".into());
        let err = client
            .query_analytics(
                "https://example.com/",
                "2026-01-01",
                "2026-01-31",
                &["referrer".into()],
                10,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }
}
