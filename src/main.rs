//! MCP server binary entry point.

use anyhow::{Context, Result};
use clap::Parser;
use sqlite_registry_mcp::{
    config::ServerConfig,
    protocol::McpServerBuilder,
    server::{McpHandler, ServerStateBuilder},
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(version, about = "MCP server for a registry of SQLite databases")]
struct Cli {
    /// Catalog database file.
    #[arg(long, env = "SQLITE_MCP_REGISTRY")]
    registry: Option<PathBuf>,

    /// Database file registered as `default` at startup.
    #[arg(long = "db", env = "SQLITE_MCP_DEFAULT_DB")]
    default_database: Option<PathBuf>,

    /// Maximum batch operations in flight.
    #[arg(long)]
    batch_concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    info!(
        "Starting {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let config = build_config(cli)?;
    info!(registry = %config.registry_path.display(), "Opening catalog");

    let state = Arc::new(
        ServerStateBuilder::new()
            .config(config)
            .build()
            .await
            .context("failed to initialize server state")?,
    );

    if let Some(path) = state.config.default_database.clone() {
        state.register_default_database(&path).await?;
    }

    info!(
        "Server state initialized with {} capabilities",
        state.capabilities.len()
    );

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let server = McpServerBuilder::new()
        .handler(McpHandler::new(Arc::clone(&state)))
        .name(state.config.name.to_string())
        .version(state.config.version.to_string())
        .build()?;

    let outcome = server.run(cancel).await;

    if let Err(e) = state.shutdown().await {
        error!("Error while closing databases: {}", e);
    }

    outcome?;
    info!("Server shutdown complete");
    Ok(())
}

fn build_config(cli: Cli) -> Result<ServerConfig> {
    let mut builder = ServerConfig::builder().from_env()?;

    if let Some(path) = cli.registry {
        builder = builder.registry_path(std::path::absolute(&path)?);
    }
    if let Some(path) = cli.default_database {
        builder = builder.default_database(std::path::absolute(&path)?);
    }
    if let Some(limit) = cli.batch_concurrency {
        builder = builder.batch_concurrency(limit);
    }

    let mut config = builder.build()?;
    // Catalog entries need absolute paths.
    if let Some(path) = config.default_database.take() {
        config.default_database = Some(std::path::absolute(path)?);
    }
    Ok(config)
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sqlite_registry_mcp=info,warn"));

    // stdout carries the protocol; logs go to stderr as JSON.
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .json()
        .init();
}
