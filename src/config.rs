use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Root secret for the credential vault. Optional at load time:
    /// vault operations fail individually when it is absent rather
    /// than refusing to start the process.
    pub master_secret: Option<String>,
    /// Shared secret authenticating the external scheduler's sweep calls.
    pub sweep_secret: Option<String>,
    /// OAuth client credentials per provider family.
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub linkedin_client_id: Option<String>,
    pub linkedin_client_secret: Option<String>,
    pub twitter_consumer_key: Option<String>,
    pub twitter_consumer_secret: Option<String>,
    /// Google Ads developer token, sent alongside OAuth credentials.
    pub google_ads_developer_token: Option<String>,
    /// Overrides every provider token endpoint. Integration tests use
    /// this to aim token exchanges at a mock server. Never set in
    /// production.
    pub token_url_override: Option<String>,
    /// Same idea for the Google Ads API base URL, used by discovery tests.
    pub ads_base_url_override: Option<String>,
    /// Default requests-per-minute ceiling for newly created endpoints.
    pub default_rate_limit: i32,
    /// Audit entries older than this many days are purged by the
    /// retention job. 0 disables purging.
    pub audit_retention_days: i64,
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let master_secret = std::env::var("TOOLGATE_MASTER_SECRET").ok();

    if master_secret.is_none() {
        let env_mode = std::env::var("TOOLGATE_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!(
                "TOOLGATE_MASTER_SECRET is not set. \
                 Connected-account secrets cannot be decrypted without it."
            );
        }
        eprintln!("⚠️  TOOLGATE_MASTER_SECRET is not set; vault operations will fail until it is.");
    }

    Ok(Config {
        port: std::env::var("TOOLGATE_PORT")
            .unwrap_or_else(|_| "8090".into())
            .parse()
            .unwrap_or(8090),
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/toolgate".into()),
        master_secret,
        sweep_secret: std::env::var("TOOLGATE_SWEEP_SECRET").ok(),
        google_client_id: std::env::var("GOOGLE_CLIENT_ID").ok(),
        google_client_secret: std::env::var("GOOGLE_CLIENT_SECRET").ok(),
        linkedin_client_id: std::env::var("LINKEDIN_CLIENT_ID").ok(),
        linkedin_client_secret: std::env::var("LINKEDIN_CLIENT_SECRET").ok(),
        twitter_consumer_key: std::env::var("TWITTER_CONSUMER_KEY").ok(),
        twitter_consumer_secret: std::env::var("TWITTER_CONSUMER_SECRET").ok(),
        google_ads_developer_token: std::env::var("GOOGLE_ADS_DEVELOPER_TOKEN").ok(),
        token_url_override: std::env::var("TOOLGATE_TOKEN_URL_OVERRIDE").ok(),
        ads_base_url_override: std::env::var("TOOLGATE_ADS_BASE_URL_OVERRIDE").ok(),
        default_rate_limit: std::env::var("TOOLGATE_DEFAULT_RPM")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60),
        audit_retention_days: std::env::var("TOOLGATE_AUDIT_RETENTION_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(90),
    })
}
