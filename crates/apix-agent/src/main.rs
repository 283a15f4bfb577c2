//! apix-bridge Agent
//!
//! Exposes a local HTTP service through a broker tunnel.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use apix_agent::{register, AgentRunner, Forwarder};
use apix_core::config::{self, AgentConfig};

#[derive(Parser)]
#[command(name = "apix-agent")]
#[command(about = "apix-bridge agent - exposes a local service through a broker")]
#[command(version)]
struct Args {
    /// Broker base URL, e.g. http://host:8000
    #[arg(short, long, env = "APIX_SERVER")]
    server: Option<String>,

    /// Local port to expose (shorthand for --local-url http://127.0.0.1:<port>)
    #[arg(short, long, conflicts_with = "local_url")]
    port: Option<u16>,

    /// Base URL of the local service
    #[arg(long)]
    local_url: Option<String>,

    /// Requested tunnel name (random when omitted)
    #[arg(short, long)]
    username: Option<String>,

    /// Tunnel TTL in seconds
    #[arg(long)]
    ttl: Option<i64>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

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

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_agent_config_path();
        if default_path.exists() {
            config::load_config(&default_path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
                AgentConfig::default()
            })
        } else {
            AgentConfig::default()
        }
    };

    // Command line overrides
    if let Some(server) = args.server {
        config.server_url = server;
    }
    if let Some(port) = args.port {
        config.local_url = format!("http://127.0.0.1:{}", port);
    }
    if let Some(local_url) = args.local_url {
        config.local_url = local_url;
    }
    if args.username.is_some() {
        config.username = args.username;
    }
    if let Some(ttl) = args.ttl {
        config.ttl_seconds = ttl;
    }

    let client = reqwest::Client::new();
    let registration = register(&client, &config)
        .await
        .context("Tunnel registration failed")?;
    println!("Tunnel: {}", registration.public_url);

    let forwarder = Forwarder::new(config.local_url.clone(), config.local_timeout)
        .context("Failed to build HTTP client")?;

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
                tracing::info!("Received Ctrl+C, shutting down...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, shutting down...");
            }
        }

        cancel_clone.cancel();
    });

    let runner = AgentRunner::new(&config, registration.tunnel_id, forwarder, cancel);
    runner.run().await;

    Ok(())
}
