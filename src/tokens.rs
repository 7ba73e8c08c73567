//! Token lifecycle: hand out a currently-valid upstream access token
//! for a connection, refreshing through the provider's token endpoint
//! when expiry is near.
//!
//! Refreshes are serialized per connection id: concurrent callers that
//! observe a stale token await one in-flight refresh and re-check
//! freshness after acquiring the lock, instead of issuing duplicates.

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::connection::{ConnectionRow, ConnectionStatus};
use crate::permissions::Provider;
use crate::providers::http::UpstreamClient;
use crate::AppState;

/// Request-path staleness margin. Tight, because a refresh here blocks
/// an in-flight call.
pub const REQUEST_LOOKAHEAD_MINS: i64 = 5;

/// Sweep staleness margin. Wider, so the scheduled sweep catches
/// tokens before the request path would even notice them going stale.
pub const SWEEP_LOOKAHEAD_MINS: i64 = 10;

/// A token is stale when expiry is unset or falls inside the lookahead
/// buffer. Unset expiry on a refreshable connection means we have
/// never confirmed a lifetime, so refresh before trusting it.
pub fn is_stale(expires_at: Option<DateTime<Utc>>, lookahead_mins: i64) -> bool {
    match expires_at {
        None => true,
        Some(at) => at <= Utc::now() + Duration::minutes(lookahead_mins),
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Provider-reported lifetime in seconds.
    pub expires_in: i64,
    /// Some providers rotate the refresh token on every refresh.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Returns a currently-valid access token for the connection.
/// Callable concurrently and idempotently.
pub async fn get_valid_access_token(
    state: &AppState,
    connection_id: Uuid,
) -> Result<String, AppError> {
    let conn = state
        .db
        .get_connection(connection_id)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow!("connection {} not found", connection_id)))?;

    let provider = conn
        .provider()
        .ok_or_else(|| AppError::Internal(anyhow!("unknown provider '{}'", conn.provider)))?;

    // API-key-style providers have no refresh flow; their adapters
    // decrypt the stored value directly.
    if !provider.supports_refresh() {
        return Ok(state.vault.decrypt(&conn.encrypted_access_secret)?);
    }

    if !is_stale(conn.expires_at, REQUEST_LOOKAHEAD_MINS) {
        return Ok(state.vault.decrypt(&conn.encrypted_access_secret)?);
    }

    let lock = state.refresh_lock(connection_id);
    let _guard = lock.lock().await;

    // Another caller may have finished the refresh while we waited.
    let conn = state
        .db
        .get_connection(connection_id)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow!("connection {} not found", connection_id)))?;
    if !is_stale(conn.expires_at, REQUEST_LOOKAHEAD_MINS) {
        return Ok(state.vault.decrypt(&conn.encrypted_access_secret)?);
    }

    refresh_connection(state, &conn, provider).await
}

/// Refresh one connection's secrets via the provider token endpoint,
/// persist the rotated secrets and return the new access token.
/// Failure marks the connection `error` with the upstream text.
pub async fn refresh_connection(
    state: &AppState,
    conn: &ConnectionRow,
    provider: Provider,
) -> Result<String, AppError> {
    let refresh_secret = match &conn.encrypted_refresh_secret {
        Some(enc) => state.vault.decrypt(enc)?,
        None => {
            let msg = "no refresh secret stored";
            state
                .db
                .set_connection_status(conn.id, ConnectionStatus::Error, Some(msg))
                .await?;
            return Err(AppError::Upstream(format!(
                "{}: {}",
                conn.provider, msg
            )));
        }
    };

    let token_url = token_url(state, provider)
        .ok_or_else(|| AppError::Internal(anyhow!("{} has no token endpoint", provider)))?;
    let (client_id, client_secret) = client_credentials(state, provider)?;

    let result = request_refresh(
        &state.http,
        &token_url,
        &client_id,
        &client_secret,
        &refresh_secret,
    )
    .await;

    let token = match result {
        Ok(token) => token,
        Err(e) => {
            state
                .db
                .set_connection_status(conn.id, ConnectionStatus::Error, Some(&e.to_string()))
                .await?;
            return Err(e);
        }
    };

    let expires_at = Utc::now() + Duration::seconds(token.expires_in);
    let encrypted_access = state.vault.encrypt(&token.access_token)?;
    let encrypted_refresh = token
        .refresh_token
        .as_deref()
        .map(|t| state.vault.encrypt(t))
        .transpose()?;

    state
        .db
        .update_connection_secrets(
            conn.id,
            &encrypted_access,
            encrypted_refresh.as_deref(),
            expires_at,
        )
        .await?;

    tracing::info!(connection = %conn.id, provider = %provider, "access token refreshed");
    Ok(token.access_token)
}

/// Revoke a connection: tell the provider to invalidate the grant
/// where a revocation endpoint exists, then delete the row. The
/// upstream call is best-effort; a failure there never blocks the
/// local delete.
pub async fn revoke_connection(state: &AppState, conn: &ConnectionRow) -> Result<bool, AppError> {
    if let Some(provider) = conn.provider() {
        if let Some(url) = revoke_url(state, provider) {
            // Revoking the refresh token invalidates the whole grant;
            // fall back to the access token for connections without one.
            let secret = match &conn.encrypted_refresh_secret {
                Some(enc) => state.vault.decrypt(enc)?,
                None => state.vault.decrypt(&conn.encrypted_access_secret)?,
            };
            let (client_id, client_secret) = client_credentials(state, provider).unwrap_or_default();
            if let Err(e) = request_revoke(&state.http, &url, &client_id, &client_secret, &secret).await
            {
                tracing::warn!(
                    connection = %conn.id,
                    provider = %provider,
                    error = %e,
                    "upstream revocation failed; deleting connection anyway"
                );
            }
        }
    }
    Ok(state.db.delete_connection(conn.id).await?)
}

/// One POST to the OAuth2 revocation endpoint. Google only reads the
/// `token` field; LinkedIn also wants the client pair.
pub async fn request_revoke(
    http: &UpstreamClient,
    revoke_url: &str,
    client_id: &str,
    client_secret: &str,
    token: &str,
) -> Result<(), AppError> {
    http.send_json(
        "oauth-revoke",
        http.request(reqwest::Method::POST, revoke_url).form(&[
            ("token", token),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ]),
    )
    .await?;
    Ok(())
}

/// One POST to the OAuth2 token endpoint. No persistence; the caller
/// owns re-encryption and state transitions.
pub async fn request_refresh(
    http: &UpstreamClient,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<TokenResponse, AppError> {
    let body = http
        .send_json(
            "oauth-token",
            http.request(reqwest::Method::POST, token_url).form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ]),
        )
        .await?;

    serde_json::from_value(body)
        .map_err(|e| AppError::Upstream(format!("token endpoint returned unexpected body: {}", e)))
}

fn token_url(state: &AppState, provider: Provider) -> Option<String> {
    // Integration tests point every token exchange at a mock server.
    if let Some(url) = &state.config.token_url_override {
        return Some(url.clone());
    }
    provider.token_endpoint().map(String::from)
}

fn revoke_url(state: &AppState, provider: Provider) -> Option<String> {
    if let Some(url) = &state.config.token_url_override {
        return Some(url.clone());
    }
    provider.revoke_endpoint().map(String::from)
}

fn client_credentials(state: &AppState, provider: Provider) -> Result<(String, String), AppError> {
    let cfg = &state.config;
    let pair = match provider {
        Provider::GoogleCalendar | Provider::GoogleAds | Provider::SearchConsole => {
            (cfg.google_client_id.clone(), cfg.google_client_secret.clone())
        }
        Provider::LinkedIn => (cfg.linkedin_client_id.clone(), cfg.linkedin_client_secret.clone()),
        Provider::Twitter | Provider::OpenRouter => (None, None),
    };
    match pair {
        (Some(id), Some(secret)) => Ok((id, secret)),
        _ => Err(AppError::Internal(anyhow!(
            "OAuth client credentials not configured for {}",
            provider
        ))),
    }
}
