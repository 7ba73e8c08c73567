//! OpenRouter adapter: chat completions and model listing with the
//! stored API key as a bearer token. API-key provider; no refresh
//! flow; the caller decrypts the key directly.

use reqwest::Method;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::providers::http::UpstreamClient;

const DEFAULT_BASE: &str = "https://openrouter.ai/api/v1";

pub struct OpenRouterClient<'a> {
    http: &'a UpstreamClient,
    base: String,
    api_key: String,
}

impl<'a> OpenRouterClient<'a> {
    pub fn new(http: &'a UpstreamClient, api_key: String) -> Self {
        Self::with_base(http, api_key, DEFAULT_BASE.into())
    }

    pub fn with_base(http: &'a UpstreamClient, api_key: String, base: String) -> Self {
        Self { http, base, api_key }
    }

    pub async fn chat(
        &self,
        model: &str,
        messages: &Value,
        max_tokens: Option<u32>,
    ) -> Result<Value, AppError> {
        if model.is_empty() {
            return Err(AppError::validation("model", "must not be empty"));
        }
        let mut body = json!({
            "model": model,
            "messages": messages,
        });
        if let Some(n) = max_tokens {
            body["max_tokens"] = json!(n);
        }
        let url = format!("{}/chat/completions", self.base);
        self.http
            .send_json(
                "openrouter",
                self.http
                    .request(Method::POST, &url)
                    .bearer_auth(&self.api_key)
                    .json(&body),
            )
            .await
    }

    pub async fn list_models(&self) -> Result<Value, AppError> {
        let url = format!("{}/models", self.base);
        self.http
            .send_json(
                "openrouter",
                self.http.request(Method::GET, &url).bearer_auth(&self.api_key),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn chat_forwards_model_and_messages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(bearer_token("sk-or-v1-abc"))
            .and(body_partial_json(json!({ "model": "openai/gpt-4o-mini" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "hi" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let http = UpstreamClient::new();
        let client = OpenRouterClient::with_base(&http, "sk-or-v1-abc".into(), server.uri());
        let out = client
            .chat(
                "openai/gpt-4o-mini",
                &json!([{ "role": "user", "content": "hello" }]),
                Some(64),
            )
            .await
            .unwrap();
        assert_eq!(out["choices"][0]["message"]["content"], "hi");
    }
}
