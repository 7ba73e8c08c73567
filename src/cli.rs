use clap::{Parser, Subcommand};

/// toolgate: scoped MCP tool endpoints for connected accounts
#[derive(Parser)]
#[command(name = "toolgate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to bind
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage MCP endpoints
    Endpoint {
        #[command(subcommand)]
        command: EndpointCommands,
    },

    /// Manage connected accounts
    Connection {
        #[command(subcommand)]
        command: ConnectionCommands,
    },

    /// Run one token refresh sweep pass
    Sweep,
}

#[derive(Subcommand)]
pub enum EndpointCommands {
    /// Mint a new endpoint bound to a connection
    Create {
        #[arg(long)]
        name: String,
        /// Connection id the endpoint proxies
        #[arg(long)]
        connection: String,
        /// Granted actions, comma separated
        #[arg(long, value_delimiter = ',')]
        actions: Vec<String>,
        /// Requests-per-minute ceiling (defaults to the configured value)
        #[arg(long)]
        rate_limit: Option<i32>,
        #[arg(long)]
        project_id: Option<String>,
    },
    /// List endpoints for a project
    List {
        #[arg(long)]
        project_id: Option<String>,
    },
    /// Deactivate an endpoint (or delete it with --delete)
    Revoke {
        #[arg(long)]
        id: String,
        #[arg(long)]
        delete: bool,
    },
    /// Rotate an endpoint's API key
    RegenerateKey {
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ConnectionCommands {
    /// List connections for a project (metadata only)
    List {
        #[arg(long)]
        project_id: Option<String>,
    },
    /// Store an API-key style connection (openrouter, twitter)
    AddKey {
        #[arg(long)]
        provider: String,
        #[arg(long)]
        label: String,
        /// The API key, or the OAuth1 access token for twitter
        #[arg(long)]
        key: String,
        /// OAuth1 token secret (twitter only)
        #[arg(long)]
        secret: Option<String>,
        #[arg(long)]
        project_id: Option<String>,
    },
    /// Revoke the upstream grant (best-effort) and delete a connection
    Revoke {
        #[arg(long)]
        id: String,
    },
    /// Run Google Ads account discovery on a provisional connection
    DiscoverAds {
        #[arg(long)]
        id: String,
        /// Chosen customer id, when discovery asked for a selection
        #[arg(long)]
        customer: Option<String>,
    },
}
