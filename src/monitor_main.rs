//! Reporting engine connectivity monitor binary
//!
//! Polls the last persisted block number and logs connection state
//! changes until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use quorum_reports::config::Config;
use quorum_reports::monitor::ConnectivityMonitor;
use quorum_reports::rpc::RpcClient;
use quorum_reports::session::SessionState;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Reporting engine connectivity monitor
#[derive(Parser)]
#[command(name = "monitor")]
#[command(about = "Poll a reporting engine and track its last persisted block")]
struct Args {
    /// Path to a TOML config file (falls back to $REPORTS_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reporting engine endpoint, overrides the config file
    #[arg(short, long)]
    rpc_url: Option<String>,

    /// Poll interval in milliseconds, overrides the config file
    #[arg(short, long)]
    interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("Failed to load config")?;
    if let Some(url) = args.rpc_url {
        config.rpc_endpoint = url;
    }
    if let Some(interval_ms) = args.interval_ms {
        config.poll_interval_ms = interval_ms.max(1);
    }

    info!("Starting connectivity monitor");
    info!("RPC URL: {}", config.rpc_endpoint);
    info!("Poll interval: {}ms", config.poll_interval_ms);

    let client = RpcClient::new(config.rpc_endpoint.clone());
    let session = SessionState::new(&config).shared();
    let handle = ConnectivityMonitor::spawn(
        client,
        session.clone(),
        Duration::from_millis(config.poll_interval_ms),
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C, shutting down gracefully...");
    handle.stop().await;

    let state = session.read().await;
    info!(
        connected = state.is_connected(),
        last_block = ?state.last_persisted_block(),
        "Monitor stopped"
    );
    Ok(())
}
