use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// A named, independently-revocable proxy identity bound to exactly
/// one connection. The API key is the bearer credential agents use.
#[derive(Debug, Clone, FromRow)]
pub struct EndpointRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub connection_id: Uuid,
    pub name: String,
    pub api_key: String,
    pub granted_actions: Vec<String>,
    pub is_active: bool,
    pub rate_limit_per_minute: i32,
    pub created_at: DateTime<Utc>,
}

/// Opaque API key format: `tg_live_<uuid-simple>`.
pub fn generate_api_key() -> String {
    format!("tg_live_{}", Uuid::new_v4().simple())
}

pub struct NewEndpoint {
    pub project_id: Uuid,
    pub connection_id: Uuid,
    pub name: String,
    pub granted_actions: Vec<String>,
    pub rate_limit_per_minute: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_keys_are_opaque_and_unique() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert!(a.starts_with("tg_live_"));
        assert_eq!(a.len(), "tg_live_".len() + 32);
        assert_ne!(a, b);
    }
}
