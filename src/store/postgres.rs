use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::audit::AuditEntry;
use crate::models::connection::{ConnectionRow, ConnectionStatus, NewConnection};
use crate::models::endpoint::{generate_api_key, EndpointRow, NewEndpoint};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    // -- Connection Operations --

    pub async fn insert_connection(&self, conn: &NewConnection) -> anyhow::Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"INSERT INTO connections
               (project_id, provider, label, encrypted_access_secret, encrypted_refresh_secret, expires_at, metadata)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING id"#,
        )
        .bind(conn.project_id)
        .bind(conn.provider.as_str())
        .bind(&conn.label)
        .bind(&conn.encrypted_access_secret)
        .bind(&conn.encrypted_refresh_secret)
        .bind(conn.expires_at)
        .bind(&conn.metadata)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn get_connection(&self, id: Uuid) -> anyhow::Result<Option<ConnectionRow>> {
        let row = sqlx::query_as::<_, ConnectionRow>(
            "SELECT * FROM connections WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_connections(&self, project_id: Uuid) -> anyhow::Result<Vec<ConnectionRow>> {
        let rows = sqlx::query_as::<_, ConnectionRow>(
            "SELECT * FROM connections WHERE project_id = $1 ORDER BY created_at DESC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Persist freshly rotated secrets after a successful refresh and
    /// clear any prior error state.
    pub async fn update_connection_secrets(
        &self,
        id: Uuid,
        encrypted_access_secret: &str,
        encrypted_refresh_secret: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"UPDATE connections
               SET encrypted_access_secret = $2,
                   encrypted_refresh_secret = COALESCE($3, encrypted_refresh_secret),
                   expires_at = $4,
                   status = 'active',
                   last_error = NULL,
                   updated_at = NOW()
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(encrypted_access_secret)
        .bind(encrypted_refresh_secret)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_connection_status(
        &self,
        id: Uuid,
        status: ConnectionStatus,
        last_error: Option<&str>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE connections SET status = $2, last_error = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(last_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Shallow-merge a JSON patch into connection metadata. Used by
    /// adapters to cache resolved ids (ads customer id, author URN).
    pub async fn merge_connection_metadata(
        &self,
        id: Uuid,
        patch: &serde_json::Value,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE connections SET metadata = metadata || $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(patch)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_connection(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM connections WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Another connection in the same project/provider already tracking
    /// this ads customer id. Used by account discovery to merge
    /// provisional connections instead of duplicating them.
    pub async fn find_connection_by_customer_id(
        &self,
        project_id: Uuid,
        provider: &str,
        customer_id: &str,
        exclude: Uuid,
    ) -> anyhow::Result<Option<ConnectionRow>> {
        let row = sqlx::query_as::<_, ConnectionRow>(
            r#"SELECT * FROM connections
               WHERE project_id = $1 AND provider = $2
                 AND metadata->>'customer_id' = $3
                 AND id <> $4
               LIMIT 1"#,
        )
        .bind(project_id)
        .bind(provider)
        .bind(customer_id)
        .bind(exclude)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Connections the sweep should proactively refresh: a refresh
    /// secret is present and expiry falls within the lookahead window.
    pub async fn sweep_candidates(
        &self,
        lookahead: Duration,
    ) -> anyhow::Result<Vec<ConnectionRow>> {
        let horizon = Utc::now() + lookahead;
        let rows = sqlx::query_as::<_, ConnectionRow>(
            r#"SELECT * FROM connections
               WHERE encrypted_refresh_secret IS NOT NULL
                 AND expires_at IS NOT NULL
                 AND expires_at < $1
               ORDER BY expires_at ASC"#,
        )
        .bind(horizon)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // -- Endpoint Operations --

    pub async fn insert_endpoint(&self, endpoint: &NewEndpoint) -> anyhow::Result<EndpointRow> {
        let api_key = generate_api_key();
        let row = sqlx::query_as::<_, EndpointRow>(
            r#"INSERT INTO endpoints
               (project_id, connection_id, name, api_key, granted_actions, rate_limit_per_minute)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING *"#,
        )
        .bind(endpoint.project_id)
        .bind(endpoint.connection_id)
        .bind(&endpoint.name)
        .bind(&api_key)
        .bind(&endpoint.granted_actions)
        .bind(endpoint.rate_limit_per_minute)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_endpoint_by_api_key(
        &self,
        api_key: &str,
    ) -> anyhow::Result<Option<EndpointRow>> {
        let row = sqlx::query_as::<_, EndpointRow>(
            "SELECT * FROM endpoints WHERE api_key = $1",
        )
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_endpoints(&self, project_id: Uuid) -> anyhow::Result<Vec<EndpointRow>> {
        let rows = sqlx::query_as::<_, EndpointRow>(
            "SELECT * FROM endpoints WHERE project_id = $1 ORDER BY created_at DESC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn set_endpoint_active(&self, id: Uuid, active: bool) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE endpoints SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Rotate the endpoint's API key. The old key stops resolving the
    /// moment this commits.
    pub async fn regenerate_api_key(&self, id: Uuid) -> anyhow::Result<Option<String>> {
        let api_key = generate_api_key();
        let result = sqlx::query("UPDATE endpoints SET api_key = $2 WHERE id = $1")
            .bind(id)
            .bind(&api_key)
            .execute(&self.pool)
            .await?;
        Ok((result.rows_affected() > 0).then_some(api_key))
    }

    pub async fn delete_endpoint(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM endpoints WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -- Audit Operations --

    pub async fn insert_audit_entry(&self, entry: &AuditEntry) -> anyhow::Result<()> {
        sqlx::query(
            r#"INSERT INTO audit_entries
               (id, endpoint_id, action, input, outcome, error, duration_ms, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(entry.id)
        .bind(entry.endpoint_id)
        .bind(&entry.action)
        .bind(&entry.input)
        .bind(entry.outcome.as_str())
        .bind(&entry.error)
        .bind(entry.duration_ms)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Rolling rate-limit counter: audit entries for this endpoint in
    /// the trailing window. Count-then-insert leaves a small window
    /// where concurrent calls can admit one request over budget.
    pub async fn count_recent_audit_entries(
        &self,
        endpoint_id: Uuid,
        window_secs: i64,
    ) -> anyhow::Result<i64> {
        let since = Utc::now() - Duration::seconds(window_secs);
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM audit_entries WHERE endpoint_id = $1 AND created_at > $2",
        )
        .bind(endpoint_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Retention job: drop audit entries older than the cutoff.
    pub async fn purge_audit_entries_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM audit_entries WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
