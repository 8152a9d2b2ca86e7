//! PlaySync Server Binary
//!
//! Entry point for the PlaySync host service.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use playsync_core::SyncEngine;
use playsync_server::{
    api::{build_router, AppState},
    config::Config,
    hub::ChannelHub,
};

/// Keeps remote media players in sync
#[derive(Debug, Parser)]
#[command(name = "playsync-server", version, about)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "PLAYSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Override the bind host
    #[arg(long)]
    host: Option<String>,

    /// Override the HTTP port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    tracing::info!("Starting PlaySync server...");

    // Load configuration
    let mut config = Config::load(args.config.as_ref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.http_port = port;
    }
    config.validate()?;
    let config = Arc::new(config);

    tracing::info!(
        "Configuration: HTTP port={}, tolerance={}ms, frequency={}Hz, policy={:?}",
        config.server.http_port,
        config.sync.tolerance_ms,
        config.sync.sync_frequency_hz,
        config.sync.leader_policy
    );

    // Start the reconciliation loop
    let engine = Arc::new(SyncEngine::new(config.sync.clone())?);
    let loop_handle = engine.spawn();

    let state = AppState::new(engine.clone(), Arc::new(ChannelHub::new()), config.clone());
    let router = build_router(state);

    // Start HTTP server
    let bind_addr = format!("{}:{}", config.server.host, config.server.http_port);
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("HTTP server listening on {}", bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, initiating graceful shutdown...");
        })
        .await?;

    engine.shutdown();
    let _ = loop_handle.await;

    tracing::info!("PlaySync server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
