//! Google Calendar adapter.
//!
//! Event ids are embedded in URL paths, so they are restricted to the
//! safe identifier charset before any request is built.

use reqwest::Method;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::providers::http::UpstreamClient;
use crate::tools::validate::require_safe_id;

const DEFAULT_BASE: &str = "https://www.googleapis.com/calendar/v3";

pub struct CalendarClient<'a> {
    http: &'a UpstreamClient,
    base: String,
    token: String,
}

impl<'a> CalendarClient<'a> {
    pub fn new(http: &'a UpstreamClient, token: String) -> Self {
        Self::with_base(http, token, DEFAULT_BASE.into())
    }

    pub fn with_base(http: &'a UpstreamClient, token: String, base: String) -> Self {
        Self { http, base, token }
    }

    pub async fn list_events(
        &self,
        calendar_id: &str,
        time_min: Option<&str>,
        time_max: Option<&str>,
        max_results: u32,
    ) -> Result<Value, AppError> {
        require_safe_calendar_id("calendar_id", calendar_id)?;
        let url = format!("{}/calendars/{}/events", self.base, calendar_id);

        let mut query: Vec<(&str, String)> = vec![
            ("maxResults", max_results.to_string()),
            ("singleEvents", "true".into()),
            ("orderBy", "startTime".into()),
        ];
        if let Some(t) = time_min {
            query.push(("timeMin", t.into()));
        }
        if let Some(t) = time_max {
            query.push(("timeMax", t.into()));
        }

        self.http
            .send_json(
                "google_calendar",
                self.http
                    .request(Method::GET, &url)
                    .bearer_auth(&self.token)
                    .query(&query),
            )
            .await
    }

    pub async fn create_event(&self, calendar_id: &str, event: Value) -> Result<Value, AppError> {
        require_safe_calendar_id("calendar_id", calendar_id)?;
        let url = format!("{}/calendars/{}/events", self.base, calendar_id);
        self.http
            .send_json(
                "google_calendar",
                self.http
                    .request(Method::POST, &url)
                    .bearer_auth(&self.token)
                    .json(&event),
            )
            .await
    }

    pub async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: Value,
    ) -> Result<Value, AppError> {
        require_safe_calendar_id("calendar_id", calendar_id)?;
        require_safe_id("event_id", event_id)?;
        let url = format!("{}/calendars/{}/events/{}", self.base, calendar_id, event_id);
        self.http
            .send_json(
                "google_calendar",
                self.http
                    .request(Method::PATCH, &url)
                    .bearer_auth(&self.token)
                    .json(&patch),
            )
            .await
    }

    pub async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<Value, AppError> {
        require_safe_calendar_id("calendar_id", calendar_id)?;
        require_safe_id("event_id", event_id)?;
        let url = format!("{}/calendars/{}/events/{}", self.base, calendar_id, event_id);
        self.http
            .send_json(
                "google_calendar",
                self.http
                    .request(Method::DELETE, &url)
                    .bearer_auth(&self.token),
            )
            .await
    }

    pub async fn free_busy(
        &self,
        time_min: &str,
        time_max: &str,
        calendar_ids: &[String],
    ) -> Result<Value, AppError> {
        let items: Vec<Value> = calendar_ids.iter().map(|id| json!({ "id": id })).collect();
        let url = format!("{}/freeBusy", self.base);
        self.http
            .send_json(
                "google_calendar",
                self.http
                    .request(Method::POST, &url)
                    .bearer_auth(&self.token)
                    .json(&json!({
                        "timeMin": time_min,
                        "timeMax": time_max,
                        "items": items,
                    })),
            )
            .await
    }
}

/// Calendar ids are either "primary" or an email-shaped address; allow
/// the safe charset plus `@` and `.` but nothing path-significant.
fn require_safe_calendar_id(field: &str, value: &str) -> Result<(), AppError> {
    let ok = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '@' | '.'));
    if ok {
        Ok(())
    } else {
        Err(AppError::validation(
            field,
            "must contain only alphanumerics, '_', '-', '@' or '.'",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn list_events_sends_bearer_and_window() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(bearer_token("tok-123"))
            .and(query_param("timeMin", "2026-01-01T00:00:00Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let http = UpstreamClient::new();
        let client = CalendarClient::with_base(&http, "tok-123".into(), server.uri());
        let out = client
            .list_events("primary", Some("2026-01-01T00:00:00Z"), None, 10)
            .await
            .unwrap();
        assert_eq!(out["items"], json!([]));
    }

    #[tokio::test]
    async fn path_traversal_in_event_id_is_rejected_before_any_request() {
        let http = UpstreamClient::new();
        // Base URL is unroutable on purpose: validation must fire first.
        let client = CalendarClient::with_base(&http, "tok".into(), "http://127.0.0.1:1".into());
        let err = client
            .delete_event("primary", "../../../admin")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn calendar_id_charset() {
        assert!(require_safe_calendar_id("calendar_id", "primary").is_ok());
        assert!(require_safe_calendar_id("calendar_id", "team@example.com").is_ok());
        assert!(require_safe_calendar_id("calendar_id", "a/b").is_err());
        assert!(require_safe_calendar_id("calendar_id", "").is_err());
    }
}
