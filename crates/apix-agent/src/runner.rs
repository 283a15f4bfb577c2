//! Agent session loop
//!
//! Connects to the broker, attaches to the registered tunnel, and serves
//! request frames until the connection drops, then reconnects after the
//! configured delay. Runs until cancelled.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use apix_core::config::{AgentConfig, BackoffConfig};
use apix_core::error::ConnectionError;
use apix_core::{Connection, TunnelId};
use apix_protocol::{Frame, ProtocolError, RequestId, ResponseFrame};

use crate::forwarder::Forwarder;
use crate::tunnel::{ExponentialBackoff, TunnelConnector};

/// Send the handshake frame binding `connection` to `tunnel_id`
pub async fn attach(connection: &dyn Connection, tunnel_id: &TunnelId) -> Result<(), ConnectionError> {
    connection
        .send_frame(&Frame::register(tunnel_id.as_str()))
        .await
}

/// Serve request frames until the connection fails, returning the failure.
///
/// Each request is forwarded on its own task; responses are written as they
/// complete, in any order.
pub async fn serve(connection: Arc<dyn Connection>, forwarder: Arc<Forwarder>) -> ConnectionError {
    loop {
        let text = match connection.receive().await {
            Ok(text) => text,
            Err(e) => return e,
        };

        match apix_protocol::decode(&text) {
            Ok(Frame::Request { payload }) => {
                let connection = Arc::clone(&connection);
                let forwarder = Arc::clone(&forwarder);
                tokio::spawn(async move {
                    let response = forwarder.forward(payload).await;
                    reply(connection.as_ref(), response).await;
                });
            }
            Ok(other) => {
                tracing::debug!("Ignoring {} frame", other.frame_type().as_str());
            }
            Err(e) => match salvage_request_id(&text) {
                Some(id) => {
                    tracing::warn!("Malformed request frame {}: {}", id, e);
                    let response =
                        ResponseFrame::upstream_error(id, format!("malformed request: {}", e));
                    reply(connection.as_ref(), response).await;
                }
                None => tracing::debug!("Ignoring malformed frame: {}", e),
            },
        }
    }
}

/// Send a response frame.
///
/// A response too large to frame is replaced by a 502 for the same ID.
async fn reply(connection: &dyn Connection, response: ResponseFrame) {
    let id = response.id.clone();
    let e = match connection.send_frame(&Frame::Response { payload: response }).await {
        Ok(()) => return,
        Err(e) => e,
    };

    if let ConnectionError::Protocol(ProtocolError::FrameTooLarge { .. }) = e {
        tracing::warn!("Response {} cannot be framed: {}", id, e);
        let fallback = ResponseFrame::upstream_error(id.clone(), e);
        if let Err(e) = connection.send_frame(&Frame::Response { payload: fallback }).await {
            tracing::debug!("Could not send response {}: {}", id, e);
        }
    } else {
        tracing::debug!("Could not send response {}: {}", id, e);
    }
}

/// ID of an undecodable frame that still looks like a request.
///
/// Falls back to the `unknown` ID when the payload carries no usable ID.
/// Returns `None` for anything that is not a request frame.
fn salvage_request_id(text: &str) -> Option<RequestId> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    if value.get("type")?.as_str()? != "request" {
        return None;
    }
    let id = value
        .get("payload")
        .and_then(|payload| payload.get("id"))
        .and_then(|id| id.as_str())
        .map(RequestId::new)
        .unwrap_or_else(RequestId::unknown);
    Some(id)
}

/// Keeps the agent attached to its tunnel
pub struct AgentRunner {
    tunnel_id: TunnelId,
    connector: TunnelConnector,
    forwarder: Arc<Forwarder>,
    reconnect: BackoffConfig,
    cancel: CancellationToken,
}

impl AgentRunner {
    /// Create a runner for an already registered tunnel
    pub fn new(
        config: &AgentConfig,
        tunnel_id: TunnelId,
        forwarder: Forwarder,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            tunnel_id,
            connector: TunnelConnector::new(config),
            forwarder: Arc::new(forwarder),
            reconnect: config.reconnect.clone(),
            cancel,
        }
    }

    /// Run until cancelled, reconnecting whenever the broker connection ends
    pub async fn run(&self) {
        let mut backoff = ExponentialBackoff::from_config(&self.reconnect);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.connect_and_serve(&mut backoff) => {}
            }

            let delay = backoff.next_delay();
            tracing::warn!("Reconnecting to {} in {:?}", self.connector.url(), delay);

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("Agent for tunnel {} stopped", self.tunnel_id);
    }

    async fn connect_and_serve(&self, backoff: &mut ExponentialBackoff) {
        let connection: Arc<dyn Connection> = match self.connector.connect().await {
            Ok(connection) => Arc::new(connection),
            Err(e) => {
                tracing::warn!("{}", e);
                return;
            }
        };

        if let Err(e) = attach(connection.as_ref(), &self.tunnel_id).await {
            tracing::warn!("Failed to attach to tunnel {}: {}", self.tunnel_id, e);
            return;
        }
        backoff.reset();
        tracing::info!(
            "Attached to tunnel {}, forwarding to {}",
            self.tunnel_id,
            self.forwarder.local_url()
        );

        let reason = serve(Arc::clone(&connection), Arc::clone(&self.forwarder)).await;
        tracing::warn!("Broker connection lost: {}", reason);
        if let Err(e) = connection.close().await {
            tracing::debug!("Close failed: {}", e);
        }
    }
}
