//! HTTP listener
//!
//! Binds the broker's public port and serves the router until shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::server::routes::router;
use crate::state::BrokerState;

/// HTTP server for public traffic and agent connections
pub struct HttpServer {
    /// Shared broker state
    state: Arc<BrokerState>,
    /// Cancellation token for graceful shutdown
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(state: Arc<BrokerState>, cancel: CancellationToken) -> Self {
        Self { state, cancel }
    }

    /// Bind to `bind_addr` and serve until cancelled
    pub async fn run(&self, bind_addr: &str) -> Result<()> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind to {}", bind_addr))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!("Broker listening on {}", local_addr);

        let cancel = self.cancel.clone();
        axum::serve(listener, router(Arc::clone(&self.state)).into_make_service())
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
                tracing::info!("HTTP server shutting down");
            })
            .await
            .context("HTTP server failed")?;

        Ok(())
    }
}
