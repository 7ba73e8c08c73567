//! LinkedIn adapter: profile lookup and UGC post publishing.
//!
//! Post creation needs the member's author URN; it is resolved from
//! the profile once and cached in connection metadata.

use reqwest::Method;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::providers::http::UpstreamClient;

const DEFAULT_BASE: &str = "https://api.linkedin.com";

pub struct LinkedInClient<'a> {
    http: &'a UpstreamClient,
    base: String,
    token: String,
}

impl<'a> LinkedInClient<'a> {
    pub fn new(http: &'a UpstreamClient, token: String) -> Self {
        Self::with_base(http, token, DEFAULT_BASE.into())
    }

    pub fn with_base(http: &'a UpstreamClient, token: String, base: String) -> Self {
        Self { http, base, token }
    }

    /// OpenID userinfo: name, picture and the member id (`sub`).
    pub async fn get_profile(&self) -> Result<Value, AppError> {
        let url = format!("{}/v2/userinfo", self.base);
        self.http
            .send_json(
                "linkedin",
                self.http.request(Method::GET, &url).bearer_auth(&self.token),
            )
            .await
    }

    /// The member id from the profile, used to build the author URN.
    pub async fn resolve_member_id(&self) -> Result<String, AppError> {
        let profile = self.get_profile().await?;
        profile
            .get("sub")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| AppError::Upstream("linkedin: userinfo response had no 'sub'".into()))
    }

    pub async fn create_post(
        &self,
        member_id: &str,
        text: &str,
        visibility: &str,
    ) -> Result<Value, AppError> {
        if text.is_empty() || text.chars().count() > 3000 {
            return Err(AppError::validation("text", "must be 1-3000 characters"));
        }
        let visibility = match visibility {
            "PUBLIC" | "CONNECTIONS" => visibility,
            _ => {
                return Err(AppError::validation(
                    "visibility",
                    "must be PUBLIC or CONNECTIONS",
                ))
            }
        };

        let url = format!("{}/v2/ugcPosts", self.base);
        let body = json!({
            "author": format!("urn:li:person:{}", member_id),
            "lifecycleState": "PUBLISHED",
            "specificContent": {
                "com.linkedin.ugc.ShareContent": {
                    "shareCommentary": { "text": text },
                    "shareMediaCategory": "NONE"
                }
            },
            "visibility": {
                "com.linkedin.ugc.MemberNetworkVisibility": visibility
            }
        });

        self.http
            .send_json(
                "linkedin",
                self.http
                    .request(Method::POST, &url)
                    .bearer_auth(&self.token)
                    .header("X-Restli-Protocol-Version", "2.0.0")
                    .json(&body),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn member_id_comes_from_userinfo_sub() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sub": "aBcD1234", "name": "Jane Example"
            })))
            .mount(&server)
            .await;

        let http = UpstreamClient::new();
        let client = LinkedInClient::with_base(&http, "tok".into(), server.uri());
        assert_eq!(client.resolve_member_id().await.unwrap(), "aBcD1234");
    }

    #[tokio::test]
    async fn create_post_builds_the_ugc_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/ugcPosts"))
            .and(header("X-Restli-Protocol-Version", "2.0.0"))
            .and(body_partial_json(json!({
                "author": "urn:li:person:aBcD1234",
                "lifecycleState": "PUBLISHED"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "urn:li:share:1" })))
            .expect(1)
            .mount(&server)
            .await;

        let http = UpstreamClient::new();
        let client = LinkedInClient::with_base(&http, "tok".into(), server.uri());
        let out = client.create_post("aBcD1234", "Hello network", "PUBLIC").await.unwrap();
        assert_eq!(out["id"], "urn:li:share:1");
    }

    #[tokio::test]
    async fn visibility_is_a_closed_set() {
        let http = UpstreamClient::new();
        let client = LinkedInClient::with_base(&http, "tok".into(), "http://127.0.0.1:1".into());
        let err = client.create_post("id", "text", "EVERYONE").await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }
}
