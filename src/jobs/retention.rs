//! Background job: purge audit entries past the retention window.
//!
//! Runs hourly. The audit trail doubles as the rate-limit counter, so
//! rows are only ever deleted well outside the rolling window.

use std::time::Duration;

use chrono::Utc;
use tokio::time;

use crate::store::postgres::PgStore;

/// Spawn the background retention task. Call this once at startup.
/// A zero or negative retention disables purging entirely.
pub fn spawn(db: PgStore, retention_days: i64) {
    if retention_days <= 0 {
        tracing::info!("audit retention disabled");
        return;
    }
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            if let Err(e) = purge_expired(&db, retention_days).await {
                tracing::error!("audit retention job failed: {}", e);
            }
        }
    });
}

async fn purge_expired(db: &PgStore, retention_days: i64) -> anyhow::Result<()> {
    let cutoff = Utc::now() - chrono::Duration::days(retention_days);
    let purged = db.purge_audit_entries_before(cutoff).await?;
    if purged > 0 {
        tracing::info!(rows = purged, "purged expired audit entries");
    }
    Ok(())
}
