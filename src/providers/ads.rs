//! Google Ads adapter: GAQL reporting plus account discovery.
//!
//! A fresh OAuth handshake yields a provisional connection with no
//! resolved customer id. Discovery lists every accessible customer,
//! probes each for ENABLED status, and then either auto-resolves,
//! merges into an existing connection tracking the same customer, or
//! asks the user to choose. Zero usable accounts deletes the
//! provisional connection.

use reqwest::Method;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::connection::ConnectionRow;
use crate::providers::http::UpstreamClient;
use crate::tools::validate::require_safe_id;
use crate::{tokens, AppState};

const DEFAULT_BASE: &str = "https://googleads.googleapis.com/v17";

pub struct AdsClient<'a> {
    http: &'a UpstreamClient,
    base: String,
    token: String,
    developer_token: String,
}

impl<'a> AdsClient<'a> {
    pub fn new(http: &'a UpstreamClient, token: String, developer_token: String) -> Self {
        Self::with_base(http, token, developer_token, DEFAULT_BASE.into())
    }

    pub fn with_base(
        http: &'a UpstreamClient,
        token: String,
        developer_token: String,
        base: String,
    ) -> Self {
        Self {
            http,
            base,
            token,
            developer_token,
        }
    }

    /// Customer ids accessible to the authenticated user, with the
    /// `customers/` resource prefix stripped.
    pub async fn list_accessible_customers(&self) -> Result<Vec<String>, AppError> {
        let url = format!("{}/customers:listAccessibleCustomers", self.base);
        let body = self
            .http
            .send_json(
                "google_ads",
                self.http
                    .request(Method::GET, &url)
                    .bearer_auth(&self.token)
                    .header("developer-token", &self.developer_token),
            )
            .await?;

        let names = body
            .get("resourceNames")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(names
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim_start_matches("customers/").to_string())
            .collect())
    }

    /// GAQL search against one customer.
    pub async fn search(&self, customer_id: &str, query: &str) -> Result<Value, AppError> {
        require_safe_id("customer_id", customer_id)?;
        let url = format!("{}/customers/{}/googleAds:search", self.base, customer_id);
        self.http
            .send_json(
                "google_ads",
                self.http
                    .request(Method::POST, &url)
                    .bearer_auth(&self.token)
                    .header("developer-token", &self.developer_token)
                    .json(&json!({ "query": query })),
            )
            .await
    }

    /// Probe one customer: true when the account exists and is ENABLED.
    /// Probe failures (cancelled accounts return errors here) read as
    /// "not usable", not as a fatal discovery error.
    pub async fn is_enabled(&self, customer_id: &str) -> bool {
        let query = "SELECT customer.id, customer.status FROM customer";
        match self.search(customer_id, query).await {
            Ok(body) => body
                .get("results")
                .and_then(|v| v.as_array())
                .and_then(|rows| rows.first())
                .and_then(|row| row.pointer("/customer/status"))
                .and_then(|v| v.as_str())
                .map(|s| s == "ENABLED")
                .unwrap_or(false),
            Err(e) => {
                tracing::debug!(customer = customer_id, "customer probe failed: {}", e);
                false
            }
        }
    }

    pub async fn list_campaigns(&self, customer_id: &str) -> Result<Value, AppError> {
        self.search(
            customer_id,
            "SELECT campaign.id, campaign.name, campaign.status, campaign.advertising_channel_type \
             FROM campaign ORDER BY campaign.id",
        )
        .await
    }

    pub async fn campaign_metrics(
        &self,
        customer_id: &str,
        date_range: &str,
    ) -> Result<Value, AppError> {
        require_gaql_date_range(date_range)?;
        let query = format!(
            "SELECT campaign.id, campaign.name, metrics.impressions, metrics.clicks, \
             metrics.cost_micros, metrics.conversions FROM campaign WHERE segments.date DURING {}",
            date_range
        );
        self.search(customer_id, &query).await
    }

    pub async fn search_terms(
        &self,
        customer_id: &str,
        date_range: &str,
    ) -> Result<Value, AppError> {
        require_gaql_date_range(date_range)?;
        let query = format!(
            "SELECT search_term_view.search_term, metrics.impressions, metrics.clicks \
             FROM search_term_view WHERE segments.date DURING {}",
            date_range
        );
        self.search(customer_id, &query).await
    }
}

/// Date ranges are interpolated into GAQL, so only the named presets
/// are accepted.
fn require_gaql_date_range(range: &str) -> Result<(), AppError> {
    const ALLOWED: [&str; 5] = [
        "TODAY",
        "YESTERDAY",
        "LAST_7_DAYS",
        "LAST_30_DAYS",
        "THIS_MONTH",
    ];
    if ALLOWED.contains(&range) {
        Ok(())
    } else {
        Err(AppError::validation(
            "date_range",
            format!("must be one of {:?}", ALLOWED),
        ))
    }
}

// ── Account discovery ──────────────────────────────────────────

#[derive(Debug, PartialEq)]
pub enum DiscoveryOutcome {
    /// One enabled account; its id is now stored on the connection.
    Resolved { customer_id: String },
    /// The account was already tracked by another connection; the
    /// provisional one was discarded.
    Merged { existing_connection_id: Uuid },
    /// Several distinct accounts; the user must choose before any
    /// grant can be created.
    SelectionRequired { customer_ids: Vec<String> },
    /// Nothing usable; the provisional connection was deleted.
    NoAccounts,
}

/// Pure classification of probe results, separated from the I/O so the
/// branch semantics stay testable.
pub fn classify_discovery(enabled: Vec<String>) -> DiscoveryOutcome {
    match enabled.len() {
        0 => DiscoveryOutcome::NoAccounts,
        1 => DiscoveryOutcome::Resolved {
            customer_id: enabled.into_iter().next().unwrap(),
        },
        _ => DiscoveryOutcome::SelectionRequired {
            customer_ids: enabled,
        },
    }
}

/// Run discovery for a provisional connection and apply the outcome.
pub async fn discover_account(
    state: &AppState,
    conn: &ConnectionRow,
) -> Result<DiscoveryOutcome, AppError> {
    let token = tokens::get_valid_access_token(state, conn.id).await?;
    let developer_token = state
        .config
        .google_ads_developer_token
        .clone()
        .ok_or_else(|| anyhow::anyhow!("GOOGLE_ADS_DEVELOPER_TOKEN not configured"))
        .map_err(AppError::Internal)?;
    let client = match &state.config.ads_base_url_override {
        Some(base) => AdsClient::with_base(&state.http, token, developer_token, base.clone()),
        None => AdsClient::new(&state.http, token, developer_token),
    };

    let candidates = client.list_accessible_customers().await?;
    let mut enabled = Vec::new();
    for id in candidates {
        if client.is_enabled(&id).await {
            enabled.push(id);
        }
    }

    match classify_discovery(enabled) {
        DiscoveryOutcome::NoAccounts => {
            state.db.delete_connection(conn.id).await?;
            tracing::warn!(connection = %conn.id, "ads discovery found no enabled accounts");
            Ok(DiscoveryOutcome::NoAccounts)
        }
        DiscoveryOutcome::Resolved { customer_id } => {
            resolve_customer(state, conn, &customer_id).await
        }
        outcome @ DiscoveryOutcome::SelectionRequired { .. } => Ok(outcome),
        DiscoveryOutcome::Merged { .. } => unreachable!("classification never merges"),
    }
}

/// Bind a chosen customer id to the connection, merging into an
/// existing connection if one already tracks this customer for the
/// same project and provider.
pub async fn resolve_customer(
    state: &AppState,
    conn: &ConnectionRow,
    customer_id: &str,
) -> Result<DiscoveryOutcome, AppError> {
    require_safe_id("customer_id", customer_id)?;

    if let Some(existing) = state
        .db
        .find_connection_by_customer_id(conn.project_id, &conn.provider, customer_id, conn.id)
        .await?
    {
        state.db.delete_connection(conn.id).await?;
        tracing::info!(
            provisional = %conn.id,
            existing = %existing.id,
            "merged provisional ads connection into existing one"
        );
        return Ok(DiscoveryOutcome::Merged {
            existing_connection_id: existing.id,
        });
    }

    state
        .db
        .merge_connection_metadata(conn.id, &json!({ "customer_id": customer_id }))
        .await?;
    Ok(DiscoveryOutcome::Resolved {
        customer_id: customer_id.to_string(),
    })
}
