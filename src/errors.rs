use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Vault-level failures. Format and authentication errors are distinct
/// and must never be collapsed into "not found".
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("master secret is not configured")]
    MissingMasterSecret,

    #[error("ciphertext format invalid: expected nonce:tag:ciphertext")]
    Format,

    #[error("ciphertext authentication failed")]
    Authentication,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid API key")]
    InvalidApiKey,

    #[error("endpoint deactivated")]
    EndpointDeactivated,

    #[error("action not granted: {0}")]
    ActionNotGranted(String),

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("invalid input for '{field}': {reason}")]
    Validation { field: String, reason: String },

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Helper for field-level input contract violations.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// The message safe to show a caller. Validation detail names the
    /// offending field and contains no secrets; everything upstream or
    /// internal is replaced with a generic string and logged instead.
    pub fn caller_message(&self) -> String {
        match self {
            AppError::Validation { field, reason } => {
                format!("invalid input for '{}': {}", field, reason)
            }
            AppError::InvalidApiKey => "invalid or missing API key".into(),
            AppError::EndpointDeactivated => "endpoint is deactivated".into(),
            AppError::ActionNotGranted(action) => {
                format!("action '{}' is not granted to this endpoint", action)
            }
            AppError::RateLimitExceeded => "rate limit exceeded".into(),
            AppError::Upstream(_) => "upstream request failed".into(),
            AppError::Crypto(_) | AppError::Database(_) | AppError::Internal(_) => {
                "internal server error".into()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code) = match &self {
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "invalid_api_key",
            ),
            AppError::EndpointDeactivated => (
                StatusCode::FORBIDDEN,
                "authorization_error",
                "endpoint_deactivated",
            ),
            AppError::ActionNotGranted(_) => (
                StatusCode::FORBIDDEN,
                "authorization_error",
                "action_not_granted",
            ),
            AppError::RateLimitExceeded => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_error",
                "rate_limit_exceeded",
            ),
            AppError::Validation { .. } => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "validation_failed",
            ),
            AppError::Upstream(e) => {
                tracing::error!("upstream error: {}", e);
                (StatusCode::BAD_GATEWAY, "upstream_error", "upstream_failed")
            }
            AppError::Crypto(e) => {
                tracing::error!("crypto error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                )
            }
            AppError::Database(e) => {
                tracing::error!("database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                )
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": self.caller_message(),
                "type": error_type,
                "code": code,
            }
        }));

        let mut response = (status, body).into_response();

        if matches!(self, AppError::RateLimitExceeded) {
            response
                .headers_mut()
                .insert("retry-after", axum::http::HeaderValue::from_static("60"));
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_detail_never_reaches_caller() {
        let err = AppError::Upstream("google said: quota exceeded for customer 123".into());
        assert_eq!(err.caller_message(), "upstream request failed");
    }

    #[test]
    fn validation_detail_is_returned_verbatim() {
        let err = AppError::validation("event_id", "must match [A-Za-z0-9_-]");
        assert!(err.caller_message().contains("event_id"));
        assert!(err.caller_message().contains("[A-Za-z0-9_-]"));
    }

    #[test]
    fn crypto_detail_never_reaches_caller() {
        let err = AppError::Crypto(CryptoError::Authentication);
        assert_eq!(err.caller_message(), "internal server error");
    }
}
