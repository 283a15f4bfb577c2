//! apix-bridge Broker Daemon
//!
//! The broker runs on a public host, accepts agent connections on `/ws`
//! and relays public HTTP traffic to them.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use apix_broker::server::HttpServer;
use apix_broker::BrokerState;
use apix_core::config::{self, BrokerConfig};

#[derive(Parser)]
#[command(name = "apix-broker")]
#[command(about = "apix-bridge tunnel broker")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(short, long, env = "APIX_BIND")]
    bind: Option<String>,

    /// Public base URL used in registration responses (overrides config)
    #[arg(long, env = "APIX_PUBLIC_URL")]
    public_url: Option<String>,

    /// Seconds a proxied request waits for the agent (overrides config)
    #[arg(long)]
    request_timeout: Option<u64>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("apix-bridge broker starting...");

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_broker_config_path();
        if default_path.exists() {
            config::load_config(&default_path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
                BrokerConfig::default()
            })
        } else {
            tracing::info!("Using default configuration");
            BrokerConfig::default()
        }
    };

    // Command line overrides
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(public_url) = args.public_url {
        config.public_url = Some(public_url);
    }
    if let Some(secs) = args.request_timeout {
        config.request_timeout = std::time::Duration::from_secs(secs);
    }

    let bind_addr = config.bind_address.clone();
    let state = Arc::new(BrokerState::new(config));

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Setup signal handlers
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel_clone.cancel();
    });

    let server = HttpServer::new(Arc::clone(&state), cancel.clone());
    server.run(&bind_addr).await?;

    tracing::info!("Broker shutdown complete");
    Ok(())
}
