use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use natter_gateway::app;

/// Self-hosted broadcast server for chat-style events.
#[derive(Parser)]
#[command(name = "natter-gateway", version)]
struct Cli {
    /// Path to the config file (overrides NATTER_CONFIG).
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "natter_gateway=info,tower_http=warn".into()),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > NATTER_CONFIG env > ~/.natter/natter.toml
    let config_path = cli.config.or_else(|| std::env::var("NATTER_CONFIG").ok());
    let config =
        natter_core::config::NatterConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
            tracing::warn!("Config load failed ({}), using defaults", e);
            natter_core::config::NatterConfig::default()
        });

    let bind = config.server.bind.clone();
    let port = config.server.port;

    // open the message log — schema setup is idempotent
    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL;")?;
    let store = natter_store::MessageStore::new(db)?;

    let state = Arc::new(app::AppState::new(config, store));
    let router = app::build_router(Arc::clone(&state));

    // liveness sweeper runs in the background until shutdown flips
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(Arc::clone(&state.connections).run_sweeper(shutdown_rx));

    info!(channels = ?state.config.channels, "channels open");

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("natter gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    // signal sweeper to stop
    let _ = shutdown_tx.send(true);
    Ok(())
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
