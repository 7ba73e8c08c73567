use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::permissions::Provider;

/// One linked upstream account. Secrets are stored only in the vault's
/// `nonce:tag:ciphertext` format, never in plaintext and never logged.
#[derive(Debug, Clone, FromRow)]
pub struct ConnectionRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub provider: String,
    pub label: String,
    pub encrypted_access_secret: String,
    pub encrypted_refresh_secret: Option<String>,
    /// NULL for non-expiring API-key providers.
    pub expires_at: Option<DateTime<Utc>>,
    pub status: String,
    pub last_error: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConnectionRow {
    pub fn provider(&self) -> Option<Provider> {
        Provider::parse(&self.provider)
    }

    /// Resolved Google Ads customer id, if discovery stored one.
    pub fn ads_customer_id(&self) -> Option<&str> {
        self.metadata.get("customer_id").and_then(|v| v.as_str())
    }

    /// Cached platform user id / author URN, if an adapter stored one.
    pub fn cached_user_id(&self) -> Option<&str> {
        self.metadata.get("user_id").and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Active,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Active => "active",
            ConnectionStatus::Error => "error",
        }
    }
}

pub struct NewConnection {
    pub project_id: Uuid,
    pub provider: Provider,
    pub label: String,
    pub encrypted_access_secret: String,
    pub encrypted_refresh_secret: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}
