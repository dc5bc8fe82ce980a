//! one-mcp - MCP gateway
//!
#![doc = "one-mcp - MCP gateway"]
#![doc = "Main entry point for the gateway server."]

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use one_mcp::cli::{Cli, Commands};
use one_mcp::config::Config;
use one_mcp::gateway::Gateway;
use one_mcp::server::{router, AppState};
use one_mcp::session::SessionManager;
use one_mcp::storage::SqliteStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let mut config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Validate => {
            config.validate()?;
            println!("configuration ok: listening on {}", config.bind_addr());
            Ok(())
        }
        Commands::Serve {
            host,
            port,
            data_dir,
        } => {
            // CLI flags override both file and environment.
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.data_dir = data_dir;
            }
            config.validate()?;

            serve(config).await
        }
    }
}

/// Bring up the store, the upstream set, and the HTTP listener.
async fn serve(config: Config) -> Result<()> {
    let store = Arc::new(SqliteStore::new(Path::new(&config.data_dir))?);

    let gateway = Arc::new(Gateway::new());
    let upstreams = store.list_enabled_servers()?;
    tracing::info!(count = upstreams.len(), "starting upstream clients");
    gateway.reload(upstreams).await;

    let state = AppState {
        gateway: Arc::clone(&gateway),
        sessions: Arc::new(SessionManager::new()),
        store,
        config: Arc::new(config.clone()),
    };

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!("gateway listening on http://{}", config.bind_addr());
    tracing::info!("  SSE endpoint:     GET  /mcp/sse");
    tracing::info!("  message endpoint: POST /mcp/messages");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    gateway.shutdown().await;
    tracing::info!("gateway stopped");
    Ok(())
}

/// Resolve when the process receives ctrl-c.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
    }
    tracing::info!("shutdown signal received");
}

/// Initialize tracing subscriber with environment filter
fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("one_mcp=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
