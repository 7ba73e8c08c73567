//! Request path for `/mcp/{api_key}`: resolve the key, enforce
//! endpoint state and the rolling rate limit, then serve the MCP
//! session over JSON-RPC. Every tool call leaves an audit entry.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::mcp::{
    self, CallToolParams, JsonRpcRequest, JsonRpcResponse, INVALID_PARAMS, INVALID_REQUEST,
    METHOD_NOT_FOUND, PARSE_ERROR,
};
use crate::models::audit::{AuditEntry, Outcome};
use crate::models::endpoint::EndpointRow;
use crate::tools;
use crate::AppState;

/// Rolling window for the per-endpoint rate limit.
pub const RATE_WINDOW_SECS: i64 = 60;

/// Ceiling check against the audit trail count for the last window.
/// Rate-limited requests write no audit entry, so a saturated
/// endpoint drains as the window slides.
pub fn over_limit(recent: i64, ceiling: i32) -> bool {
    recent >= ceiling as i64
}

// api_key is a bearer credential; keep it out of span fields.
#[tracing::instrument(skip(state, api_key, body), fields(req_id = %uuid::Uuid::new_v4()))]
pub async fn mcp_handler(
    State(state): State<Arc<AppState>>,
    Path(api_key): Path<String>,
    body: String,
) -> Result<Response, AppError> {
    // -- 1. Resolve the API key --
    let endpoint = state
        .db
        .get_endpoint_by_api_key(&api_key)
        .await?
        .ok_or(AppError::InvalidApiKey)?;

    // -- 2. Endpoint state --
    if !endpoint.is_active {
        return Err(AppError::EndpointDeactivated);
    }

    // -- 3. Rolling rate limit --
    let recent = state
        .db
        .count_recent_audit_entries(endpoint.id, RATE_WINDOW_SECS)
        .await?;
    if over_limit(recent, endpoint.rate_limit_per_minute) {
        tracing::info!(endpoint_id = %endpoint.id, recent, "rate limit hit");
        return Err(AppError::RateLimitExceeded);
    }

    // -- 4. JSON-RPC envelope --
    let req: JsonRpcRequest = match serde_json::from_str(&body) {
        Ok(req) => req,
        Err(_) => {
            return Ok(rpc_response(JsonRpcResponse::error(
                Value::Null,
                PARSE_ERROR,
                "request body is not valid JSON-RPC",
            )));
        }
    };

    // Notifications get no response body.
    if req.is_notification() {
        return Ok(StatusCode::ACCEPTED.into_response());
    }
    let id = req.id.clone().unwrap_or(Value::Null);

    // -- 5. Method dispatch --
    let resp = match req.method.as_str() {
        "initialize" => JsonRpcResponse::success(id, mcp::initialize_result()),
        "ping" => JsonRpcResponse::success(id, json!({})),
        "tools/list" => {
            let tools: Vec<Value> = tools::tools_for_actions(&endpoint.granted_actions)
                .iter()
                .map(|t| t.to_mcp())
                .collect();
            JsonRpcResponse::success(id, json!({ "tools": tools }))
        }
        "tools/call" => serve_tool_call(&state, &endpoint, id, req.params).await,
        other => JsonRpcResponse::error(
            id,
            METHOD_NOT_FOUND,
            format!("method '{}' is not supported", other),
        ),
    };
    Ok(rpc_response(resp))
}

/// One tool invocation: grant check, execute, audit. Tool failures
/// are in-band `isError` results; only malformed params are protocol
/// errors.
async fn serve_tool_call(
    state: &Arc<AppState>,
    endpoint: &EndpointRow,
    id: Value,
    params: Option<Value>,
) -> JsonRpcResponse {
    let params: CallToolParams = match params.map(serde_json::from_value).transpose() {
        Ok(Some(p)) => p,
        _ => {
            return JsonRpcResponse::error(id, INVALID_REQUEST, "tools/call requires params.name");
        }
    };
    let args = params.arguments.unwrap_or_else(|| json!({}));
    let start = Instant::now();

    // -- Grant check: ungranted and unknown tools are indistinguishable --
    if !endpoint.granted_actions.iter().any(|a| a == &params.name) {
        let err = AppError::ActionNotGranted(params.name.clone());
        record_audit(
            state,
            AuditEntry::new(
                endpoint.id,
                &params.name,
                args,
                Outcome::Denied,
                Some(err.caller_message()),
                start.elapsed().as_millis() as u64,
            ),
        );
        return JsonRpcResponse::error(
            id,
            INVALID_PARAMS,
            format!("tool '{}' is not available on this endpoint", params.name),
        );
    }

    let conn = match state.db.get_connection(endpoint.connection_id).await {
        Ok(Some(conn)) => conn,
        Ok(None) => {
            tracing::error!(endpoint_id = %endpoint.id, "endpoint references missing connection");
            return JsonRpcResponse::error(id, mcp::INTERNAL_ERROR, "internal error");
        }
        Err(e) => {
            tracing::error!(error = %e, "connection lookup failed");
            return JsonRpcResponse::error(id, mcp::INTERNAL_ERROR, "internal error");
        }
    };

    match tools::execute(state, &conn, &params.name, &args).await {
        Ok(output) => {
            record_audit(
                state,
                AuditEntry::new(
                    endpoint.id,
                    &params.name,
                    args,
                    Outcome::Success,
                    None,
                    start.elapsed().as_millis() as u64,
                ),
            );
            JsonRpcResponse::success(id, mcp::call_tool_result(&output))
        }
        Err(err) => {
            tracing::warn!(
                endpoint_id = %endpoint.id,
                action = %params.name,
                error = %err,
                "tool execution failed"
            );
            record_audit(
                state,
                failure_entry(
                    endpoint.id,
                    &params.name,
                    args,
                    &err,
                    start.elapsed().as_millis() as u64,
                ),
            );
            JsonRpcResponse::success(id, mcp::call_tool_error(&err.caller_message()))
        }
    }
}

/// Failure rows keep the full error text for the audit trail; the
/// sanitized message goes to the caller only.
fn failure_entry(
    endpoint_id: uuid::Uuid,
    action: &str,
    input: Value,
    err: &AppError,
    duration_ms: u64,
) -> AuditEntry {
    AuditEntry::new(
        endpoint_id,
        action,
        input,
        Outcome::Error,
        Some(err.to_string()),
        duration_ms,
    )
}

/// Audit writes ride a spawned task so a slow insert never blocks the
/// agent's response.
fn record_audit(state: &Arc<AppState>, entry: AuditEntry) {
    let db = state.db.clone();
    tokio::spawn(async move {
        if let Err(e) = db.insert_audit_entry(&entry).await {
            tracing::error!(error = %e, endpoint_id = %entry.endpoint_id, "audit write failed");
        }
    });
}

fn rpc_response(resp: JsonRpcResponse) -> Response {
    (StatusCode::OK, Json(resp)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_is_inclusive() {
        assert!(!over_limit(0, 60));
        assert!(!over_limit(59, 60));
        assert!(over_limit(60, 60));
        assert!(over_limit(61, 60));
    }

    #[test]
    fn zero_ceiling_blocks_everything() {
        assert!(over_limit(0, 0));
    }

    #[test]
    fn audit_row_keeps_the_real_failure_text() {
        let err = AppError::Upstream("google_ads returned 429: quota exhausted".into());
        let entry = failure_entry(
            uuid::Uuid::new_v4(),
            "ads_list_campaigns",
            json!({}),
            &err,
            12,
        );
        assert_eq!(entry.outcome, Outcome::Error);
        assert!(entry.error.as_deref().unwrap().contains("quota exhausted"));
        // The caller-facing message stays generic.
        assert_eq!(err.caller_message(), "upstream request failed");
    }

    #[test]
    fn parse_failure_yields_null_id_envelope() {
        let resp = JsonRpcResponse::error(Value::Null, PARSE_ERROR, "bad");
        let wire = serde_json::to_value(&resp).unwrap();
        assert_eq!(wire["id"], Value::Null);
        assert_eq!(wire["error"]["code"], -32700);
    }
}
