//! Integration tests for the gateway's caller-facing contracts.
//!
//! These tests verify:
//! 1. The error taxonomy maps to the right HTTP statuses and the JSON
//!    error envelope, and internal detail never crosses the boundary
//! 2. The MCP session surface: tools/list reflects exactly the granted
//!    actions, and the JSON-RPC envelope round-trips
//! 3. The vault's at-rest format survives encrypt/decrypt and rejects
//!    tampered ciphertext
//! 4. Provider adapters drive real HTTP exchanges against a mock
//!    upstream, including OAuth1 request signing
//!
//! No database required; DB-backed paths are covered by their pure
//! decision functions.

use serde_json::{json, Value};

async fn response_body(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

mod error_contract {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use toolgate::errors::{AppError, CryptoError};

    #[tokio::test]
    async fn invalid_api_key_is_401_with_envelope() {
        let resp = AppError::InvalidApiKey.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body = response_body(resp).await;
        assert_eq!(body["error"]["type"], "authentication_error");
        assert_eq!(body["error"]["code"], "invalid_api_key");
    }

    #[tokio::test]
    async fn deactivated_endpoint_is_403() {
        let resp = AppError::EndpointDeactivated.into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn rate_limit_is_429_with_retry_after() {
        let resp = AppError::RateLimitExceeded.into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers().get("retry-after").unwrap(), "60");
    }

    #[tokio::test]
    async fn upstream_detail_is_replaced_in_the_body() {
        let resp =
            AppError::Upstream("google: quota exceeded for customer 4815162342".into())
                .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let body = response_body(resp).await;
        let message = body["error"]["message"].as_str().unwrap();
        assert_eq!(message, "upstream request failed");
        assert!(!message.contains("4815162342"));
    }

    #[tokio::test]
    async fn crypto_failures_are_opaque_500s() {
        let resp = AppError::Crypto(CryptoError::Authentication).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response_body(resp).await;
        assert_eq!(body["error"]["message"], "internal server error");
    }

    #[tokio::test]
    async fn validation_detail_names_the_field() {
        let resp = AppError::validation("date_range", "must be one of the preset ranges")
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = response_body(resp).await;
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("date_range"));
    }
}

mod mcp_session {
    use super::*;
    use toolgate::mcp::{self, JsonRpcRequest, JsonRpcResponse};
    use toolgate::tools;

    #[test]
    fn tools_list_reflects_exactly_the_granted_actions() {
        let granted = vec!["li_get_profile".to_string(), "li_create_post".to_string()];
        let listed: Vec<&str> = tools::tools_for_actions(&granted)
            .iter()
            .map(|t| t.action)
            .collect();
        assert_eq!(listed, vec!["li_get_profile", "li_create_post"]);

        // Grants {A, B} against a request involving {A, C}: only A.
        let partial = vec!["li_get_profile".to_string(), "tw_post_tweet".to_string()];
        let granted = vec!["li_get_profile".to_string(), "calendar_free_busy".to_string()];
        let listed: Vec<&str> = tools::tools_for_actions(&granted)
            .iter()
            .filter(|t| partial.iter().any(|p| p == t.action))
            .map(|t| t.action)
            .collect();
        assert_eq!(listed, vec!["li_get_profile"]);
    }

    #[test]
    fn every_listed_tool_carries_an_object_schema() {
        let all: Vec<String> = toolgate::permissions::all_actions()
            .iter()
            .map(|a| a.to_string())
            .collect();
        for tool in tools::tools_for_actions(&all) {
            let wire = tool.to_mcp();
            assert_eq!(wire["inputSchema"]["type"], "object", "{}", tool.action);
            assert!(wire["description"].as_str().unwrap().len() > 10);
        }
    }

    #[test]
    fn initialize_result_names_the_server() {
        let result = mcp::initialize_result();
        assert_eq!(result["serverInfo"]["name"], "toolgate");
        assert_eq!(result["protocolVersion"], mcp::PROTOCOL_VERSION);
    }

    #[test]
    fn envelope_roundtrip_preserves_opaque_ids() {
        let req: JsonRpcRequest = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": "client-chosen-7",
            "method": "tools/call",
            "params": { "name": "tw_get_me" }
        }))
        .unwrap();
        let resp = JsonRpcResponse::success(req.id.unwrap(), json!({ "ok": true }));
        let wire = serde_json::to_value(&resp).unwrap();
        assert_eq!(wire["id"], "client-chosen-7");
    }

    #[test]
    fn tool_failures_are_in_band_results() {
        let wire = mcp::call_tool_error("upstream request failed");
        assert_eq!(wire["isError"], true);
        // Still a successful JSON-RPC result, not a protocol error.
        let resp = JsonRpcResponse::success(json!(1), wire);
        assert!(serde_json::to_value(&resp).unwrap().get("error").is_none());
    }
}

mod vault_contract {
    use toolgate::vault::VaultCrypto;

    #[test]
    fn secrets_roundtrip_through_the_at_rest_format() {
        let crypto = VaultCrypto::new(Some("test-master-secret")).unwrap();
        let stored = crypto.encrypt("ya29.a0AfH6SMB-token-value").unwrap();
        assert_eq!(stored.split(':').count(), 3);
        assert_eq!(crypto.decrypt(&stored).unwrap(), "ya29.a0AfH6SMB-token-value");
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let crypto = VaultCrypto::new(Some("test-master-secret")).unwrap();
        let stored = crypto.encrypt("secret").unwrap();
        let mut chars: Vec<char> = stored.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == '0' { '1' } else { '0' };
        let tampered: String = chars.into_iter().collect();
        assert!(crypto.decrypt(&tampered).is_err());
    }

    #[test]
    fn different_master_secrets_cannot_read_each_other() {
        let a = VaultCrypto::new(Some("secret-a")).unwrap();
        let b = VaultCrypto::new(Some("secret-b")).unwrap();
        let stored = a.encrypt("token").unwrap();
        assert!(b.decrypt(&stored).is_err());
    }
}

mod upstream_exchanges {
    use super::*;
    use toolgate::providers::calendar::CalendarClient;
    use toolgate::providers::http::UpstreamClient;
    use toolgate::providers::twitter::{OAuth1Credentials, TwitterClient};
    use toolgate::tokens;
    use wiremock::matchers::{body_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn calendar_event_creation_posts_the_event_resource() {
        let server = MockServer::start().await;
        let event = json!({ "summary": "Standup", "start": { "dateTime": "2026-09-01T09:00:00Z" } });
        Mock::given(method("POST"))
            .and(path("/calendars/primary/events"))
            .and(header("authorization", "Bearer access-tok"))
            .and(body_json(&event))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "id": "evt1", "status": "confirmed" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let http = UpstreamClient::new();
        let client = CalendarClient::with_base(&http, "access-tok".into(), server.uri());
        let created = client.create_event("primary", event).await.unwrap();
        assert_eq!(created["id"], "evt1");
    }

    #[tokio::test]
    async fn tweets_are_posted_with_an_oauth1_signature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tweets"))
            .and(header_exists("authorization"))
            .and(body_json(json!({ "text": "hello from the gateway" })))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({ "data": { "id": "1", "text": "hello from the gateway" } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let http = UpstreamClient::new();
        let creds = OAuth1Credentials {
            consumer_key: "ck".into(),
            consumer_secret: "cs".into(),
            token: "tok".into(),
            token_secret: "ts".into(),
        };
        let client = TwitterClient::with_base(&http, creds, server.uri());
        let posted = client.post_tweet("hello from the gateway").await.unwrap();
        assert_eq!(posted["data"]["id"], "1");
    }

    #[tokio::test]
    async fn refresh_without_rotation_keeps_the_old_refresh_secret() {
        // Google does not always rotate; the response then omits
        // refresh_token and persistence must COALESCE the old one.
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "rotated-access",
                "expires_in": 3599
            })))
            .mount(&server)
            .await;

        let http = UpstreamClient::new();
        let token = tokens::request_refresh(
            &http,
            &format!("{}/token", server.uri()),
            "id",
            "secret",
            "kept-refresh",
        )
        .await
        .unwrap();
        assert_eq!(token.access_token, "rotated-access");
        assert!(token.refresh_token.is_none());
    }
}
