use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::routing::{any, get, post};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use toolgate::models::connection::NewConnection;
use toolgate::models::endpoint::NewEndpoint;
use toolgate::providers::ads::{self, DiscoveryOutcome};
use toolgate::store::postgres::PgStore;
use toolgate::{cli, config, gateway, jobs, permissions, tokens, tools, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "toolgate=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tools::verify_registry()?;

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Endpoint { command }) => {
            let state = connect_state(cfg).await?;
            handle_endpoint_command(&state, command).await
        }
        Some(cli::Commands::Connection { command }) => {
            let state = connect_state(cfg).await?;
            handle_connection_command(&state, command).await
        }
        Some(cli::Commands::Sweep) => {
            let state = connect_state(cfg).await?;
            let report = jobs::sweep::run_sweep(&state).await?;
            println!(
                "Sweep complete: {} candidates, {} refreshed, {} failed",
                report.candidates, report.refreshed, report.failed
            );
            for e in &report.errors {
                println!("  {}", e);
            }
            Ok(())
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn connect_state(cfg: config::Config) -> anyhow::Result<Arc<AppState>> {
    let db = PgStore::connect(&cfg.database_url).await?;
    Ok(Arc::new(AppState::new(db, cfg)))
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    tracing::info!("Connecting to database...");
    let db = PgStore::connect(&cfg.database_url).await?;

    tracing::info!("Running migrations...");
    db.migrate().await?;

    let retention_days = cfg.audit_retention_days;
    let state = Arc::new(AppState::new(db, cfg));

    jobs::retention::spawn(state.db.clone(), retention_days);

    let app = axum::Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readiness_check))
        .route("/mcp/:api_key", any(gateway::mcp_handler))
        .route("/internal/sweep", post(jobs::sweep::sweep_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers([
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::AUTHORIZATION,
                ]),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("toolgate listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn readiness_check(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> Result<&'static str, toolgate::errors::AppError> {
    sqlx::query("SELECT 1").execute(state.db.pool()).await?;
    Ok("ok")
}

async fn handle_endpoint_command(
    state: &Arc<AppState>,
    cmd: cli::EndpointCommands,
) -> anyhow::Result<()> {
    match cmd {
        cli::EndpointCommands::Create {
            name,
            connection,
            actions,
            rate_limit,
            project_id,
        } => {
            let connection_id: Uuid = connection.parse().context("invalid connection id")?;
            let conn = state
                .db
                .get_connection(connection_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("connection not found: {}", connection_id))?;
            let provider = conn
                .provider()
                .ok_or_else(|| anyhow::anyhow!("unknown provider '{}'", conn.provider))?;

            if actions.is_empty() {
                anyhow::bail!("at least one granted action is required");
            }
            tools::validate_grants(provider, &actions)
                .map_err(|e| anyhow::anyhow!(e.caller_message()))?;

            let endpoint = state
                .db
                .insert_endpoint(&NewEndpoint {
                    project_id: parse_project_id(project_id)?,
                    connection_id,
                    name,
                    granted_actions: actions,
                    rate_limit_per_minute: rate_limit
                        .unwrap_or(state.config.default_rate_limit),
                })
                .await?;
            println!(
                "Endpoint created:\n  Name: {}\n  ID:   {}\n  URL:  /mcp/{}",
                endpoint.name, endpoint.id, endpoint.api_key
            );
        }
        cli::EndpointCommands::List { project_id } => {
            let endpoints = state.db.list_endpoints(parse_project_id(project_id)?).await?;
            if endpoints.is_empty() {
                println!("No endpoints found.");
            } else {
                println!("{:<38} {:<20} {:<8} {:<6} ACTIONS", "ID", "NAME", "ACTIVE", "RPM");
                for e in endpoints {
                    println!(
                        "{:<38} {:<20} {:<8} {:<6} {}",
                        e.id,
                        e.name,
                        e.is_active,
                        e.rate_limit_per_minute,
                        e.granted_actions.join(",")
                    );
                }
            }
        }
        cli::EndpointCommands::Revoke { id, delete } => {
            let id: Uuid = id.parse().context("invalid endpoint id")?;
            let done = if delete {
                state.db.delete_endpoint(id).await?
            } else {
                state.db.set_endpoint_active(id, false).await?
            };
            if done {
                println!("Endpoint {}.", if delete { "deleted" } else { "deactivated" });
            } else {
                println!("Endpoint not found.");
            }
        }
        cli::EndpointCommands::RegenerateKey { id } => {
            let id: Uuid = id.parse().context("invalid endpoint id")?;
            match state.db.regenerate_api_key(id).await? {
                Some(key) => println!("New key minted:\n  URL: /mcp/{}", key),
                None => println!("Endpoint not found."),
            }
        }
    }
    Ok(())
}

async fn handle_connection_command(
    state: &Arc<AppState>,
    cmd: cli::ConnectionCommands,
) -> anyhow::Result<()> {
    match cmd {
        cli::ConnectionCommands::List { project_id } => {
            let conns = state.db.list_connections(parse_project_id(project_id)?).await?;
            if conns.is_empty() {
                println!("No connections found.");
            } else {
                println!("{:<38} {:<16} {:<20} {:<8} EXPIRES", "ID", "PROVIDER", "LABEL", "STATUS");
                for c in conns {
                    println!(
                        "{:<38} {:<16} {:<20} {:<8} {}",
                        c.id,
                        c.provider,
                        c.label,
                        c.status,
                        c.expires_at
                            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                            .unwrap_or_else(|| "-".into())
                    );
                }
            }
        }
        cli::ConnectionCommands::AddKey {
            provider,
            label,
            key,
            secret,
            project_id,
        } => {
            let provider = permissions::Provider::parse(&provider)
                .ok_or_else(|| anyhow::anyhow!("unknown provider: {}", provider))?;
            if provider.supports_refresh() {
                anyhow::bail!(
                    "{} connections are created through the OAuth flow, not add-key",
                    provider
                );
            }
            if provider == permissions::Provider::Twitter && secret.is_none() {
                anyhow::bail!("twitter requires --secret (the OAuth1 token secret)");
            }

            let encrypted_access_secret = state.vault.encrypt(&key)?;
            let encrypted_refresh_secret =
                secret.as_deref().map(|s| state.vault.encrypt(s)).transpose()?;

            let id = state
                .db
                .insert_connection(&NewConnection {
                    project_id: parse_project_id(project_id)?,
                    provider,
                    label: label.clone(),
                    encrypted_access_secret,
                    encrypted_refresh_secret,
                    expires_at: None,
                    metadata: serde_json::json!({}),
                })
                .await?;
            println!(
                "Connection stored:\n  Provider: {}\n  Label:    {}\n  ID:       {}",
                provider, label, id
            );
        }
        cli::ConnectionCommands::Revoke { id } => {
            let id: Uuid = id.parse().context("invalid connection id")?;
            let conn = state
                .db
                .get_connection(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("connection not found: {}", id))?;
            if tokens::revoke_connection(state, &conn).await? {
                println!("Connection {} revoked and deleted.", id);
            } else {
                println!("Connection {} was already gone.", id);
            }
        }
        cli::ConnectionCommands::DiscoverAds { id, customer } => {
            let id: Uuid = id.parse().context("invalid connection id")?;
            let conn = state
                .db
                .get_connection(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("connection not found: {}", id))?;
            let outcome = match customer {
                Some(customer_id) => ads::resolve_customer(state, &conn, &customer_id).await?,
                None => ads::discover_account(state, &conn).await?,
            };
            match outcome {
                DiscoveryOutcome::Resolved { customer_id } => {
                    println!("Resolved to customer {}.", customer_id);
                }
                DiscoveryOutcome::Merged {
                    existing_connection_id,
                } => {
                    println!(
                        "Account already connected as {}; provisional connection discarded.",
                        existing_connection_id
                    );
                }
                DiscoveryOutcome::SelectionRequired { customer_ids } => {
                    println!("Multiple enabled accounts; re-run with --customer <id>:");
                    for c in customer_ids {
                        println!("  {}", c);
                    }
                }
                DiscoveryOutcome::NoAccounts => {
                    println!("No enabled accounts; connection deleted.");
                }
            }
        }
    }
    Ok(())
}

fn parse_project_id(id: Option<String>) -> anyhow::Result<Uuid> {
    let raw = id.unwrap_or_else(|| "00000000-0000-0000-0000-000000000001".into());
    raw.parse()
        .map_err(|_| anyhow::anyhow!("invalid project ID: {}", raw))
}
