use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One record per tool invocation. Immutable once written; also the
/// counter source for the rolling rate limit. Inputs never contain
/// credentials, so the row is redacted by construction.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub action: String,
    pub input: serde_json::Value,
    pub outcome: Outcome,
    pub error: Option<String>,
    pub duration_ms: i32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Error,
    Denied,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Error => "error",
            Outcome::Denied => "denied",
        }
    }
}

impl AuditEntry {
    pub fn new(
        endpoint_id: Uuid,
        action: impl Into<String>,
        input: serde_json::Value,
        outcome: Outcome,
        error: Option<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            endpoint_id,
            action: action.into(),
            input,
            outcome,
            error,
            duration_ms: duration_ms.min(i32::MAX as u64) as i32,
            timestamp: Utc::now(),
        }
    }
}
