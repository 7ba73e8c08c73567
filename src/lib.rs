//! toolgate: scoped MCP tool endpoints for connected third-party accounts.
//!
//! Library crate: re-exports modules for the binary and for
//! integration tests in `tests/`.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

pub mod cli;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod jobs;
pub mod mcp;
pub mod models;
pub mod permissions;
pub mod providers;
pub mod store;
pub mod tokens;
pub mod tools;
pub mod vault;

/// Shared application state passed to handlers and jobs.
pub struct AppState {
    pub db: store::postgres::PgStore,
    pub vault: vault::Vault,
    pub http: providers::http::UpstreamClient,
    pub config: config::Config,
    /// Per-connection refresh locks: concurrent callers near expiry
    /// await one in-flight refresh instead of issuing duplicates.
    pub refresh_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl AppState {
    pub fn new(db: store::postgres::PgStore, config: config::Config) -> Self {
        Self {
            db,
            vault: vault::Vault::new(config.master_secret.clone()),
            http: providers::http::UpstreamClient::new(),
            config,
            refresh_locks: DashMap::new(),
        }
    }

    /// The keyed mutex serializing refreshes for one connection.
    pub fn refresh_lock(&self, connection_id: Uuid) -> Arc<Mutex<()>> {
        self.refresh_locks
            .entry(connection_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
