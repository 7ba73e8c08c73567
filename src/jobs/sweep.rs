//! Scheduled refresh sweep: walks refreshable connections whose
//! tokens expire inside the sweep lookahead and refreshes them before
//! the request path would have to. Triggered by an external scheduler
//! via `POST /internal/sweep`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Duration;
use serde::Serialize;
use subtle::ConstantTimeEq;

use crate::errors::AppError;
use crate::models::connection::ConnectionRow;
use crate::tokens::{self, SWEEP_LOOKAHEAD_MINS};
use crate::AppState;

#[derive(Debug, Default, Serialize)]
pub struct SweepReport {
    pub candidates: usize,
    pub refreshed: usize,
    pub failed: usize,
    /// Per-connection failure text, for the scheduler's logs.
    pub errors: Vec<String>,
}

/// One sweep pass. A failing connection is marked `error` by the
/// refresh path and never aborts the rest of the batch.
pub async fn run_sweep(state: &AppState) -> anyhow::Result<SweepReport> {
    let candidates = state
        .db
        .sweep_candidates(Duration::minutes(SWEEP_LOOKAHEAD_MINS))
        .await?;

    let mut report = SweepReport {
        candidates: candidates.len(),
        ..Default::default()
    };

    for conn in candidates {
        let id = conn.id;
        match sweep_one(state, conn).await {
            Ok(true) => report.refreshed += 1,
            Ok(false) => {}
            Err(e) => {
                report.failed += 1;
                report.errors.push(format!("{}: {}", id, e));
                tracing::warn!(connection = %id, error = %e, "sweep refresh failed");
            }
        }
    }

    tracing::info!(
        candidates = report.candidates,
        refreshed = report.refreshed,
        failed = report.failed,
        "sweep pass complete"
    );
    Ok(report)
}

/// Refresh one candidate under the same per-connection lock the
/// request path uses, so a sweep racing an in-flight request-path
/// refresh never issues a duplicate. Returns whether a refresh ran.
async fn sweep_one(state: &AppState, conn: ConnectionRow) -> Result<bool, AppError> {
    let provider = match conn.provider() {
        Some(p) if p.supports_refresh() => p,
        _ => return Ok(false),
    };

    let lock = state.refresh_lock(conn.id);
    let _guard = lock.lock().await;

    // A request-path refresh may have landed while this pass waited.
    let conn = match state.db.get_connection(conn.id).await? {
        Some(c) => c,
        None => return Ok(false),
    };
    if !tokens::is_stale(conn.expires_at, SWEEP_LOOKAHEAD_MINS) {
        return Ok(false);
    }

    tokens::refresh_connection(state, &conn, provider).await?;
    Ok(true)
}

/// `POST /internal/sweep`, authenticated by a shared bearer secret.
pub async fn sweep_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SweepReport>, AppError> {
    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AppError::InvalidApiKey)?;

    let expected = state
        .config
        .sweep_secret
        .as_deref()
        .ok_or(AppError::InvalidApiKey)?;

    if !secrets_match(presented, expected) {
        return Err(AppError::InvalidApiKey);
    }

    let report = run_sweep(&state).await?;
    Ok(Json(report))
}

/// Constant-time comparison; the length check short-circuits but leaks
/// nothing useful about the secret's content.
fn secrets_match(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_comparison_is_exact() {
        assert!(secrets_match("sweep-secret", "sweep-secret"));
        assert!(!secrets_match("sweep-secret", "sweep-secreT"));
        assert!(!secrets_match("sweep", "sweep-secret"));
        assert!(!secrets_match("", "sweep-secret"));
    }

    #[test]
    fn empty_report_serializes_counts() {
        let report = SweepReport::default();
        let wire = serde_json::to_value(&report).unwrap();
        assert_eq!(wire["candidates"], 0);
        assert_eq!(wire["refreshed"], 0);
        assert_eq!(wire["failed"], 0);
    }
}
