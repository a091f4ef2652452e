//! # flowgate
//!
//! Gateway server binary — wires the event bus, identity resolver and
//! HTTP/WebSocket server together and runs until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use flowgate_auth::JwtIdentityResolver;
use flowgate_bus::MemoryBus;
use flowgate_server::{GatewayServer, ServerConfig};

/// Flowgate notification gateway.
#[derive(Parser, Debug)]
#[command(name = "flowgate", about = "Workflow notification gateway")]
struct Cli {
    /// Host to bind (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides config; 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Path to a JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let metrics = flowgate_server::metrics::install_recorder();

    // The in-process aggregator: the embedding workflow engine publishes
    // its lifecycle messages here.
    let bus = Arc::new(MemoryBus::new());
    let resolver = Arc::new(JwtIdentityResolver::new());

    let server = GatewayServer::new(config, bus, resolver, metrics);
    server.start().await.context("failed to create global subscriptions")?;
    let (addr, serve_task) = server.listen().await.context("failed to bind")?;
    tracing::info!(%addr, "flowgate ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");

    server.stop().await;
    server.shutdown().drain(vec![serve_task], None).await;
    tracing::info!("goodbye");
    Ok(())
}
