//! Broker side of an agent connection
//!
//! A session waits for the agent's registration frame, binds the
//! connection to the named tunnel, then routes response frames to their
//! pending requests until the connection ends.

use std::sync::Arc;
use std::time::Duration;

use apix_core::error::{ConnectionError, SessionError};
use apix_core::{Connection, TunnelId};
use apix_protocol::Frame;

use crate::connection::{validate_tunnel_id, TunnelRegistry};
use crate::session::PendingRequests;

/// Lifecycle of a broker session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no registration frame yet
    AwaitingRegistration,
    /// Bound to a tunnel and relaying responses
    Active {
        /// Tunnel this connection serves
        tunnel_id: TunnelId,
    },
    /// Connection gone and detached from the registry
    Closed,
}

/// Drives one agent connection from handshake to teardown
pub struct BrokerSession {
    connection: Arc<dyn Connection>,
    registry: Arc<TunnelRegistry>,
    pending: Arc<PendingRequests>,
    handshake_timeout: Duration,
    state: SessionState,
}

impl BrokerSession {
    /// Create a session for a freshly accepted connection
    pub fn new(
        connection: Arc<dyn Connection>,
        registry: Arc<TunnelRegistry>,
        pending: Arc<PendingRequests>,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            connection,
            registry,
            pending,
            handshake_timeout,
            state: SessionState::AwaitingRegistration,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Run the session to completion.
    ///
    /// Returns the tunnel the connection served once it disconnects, or the
    /// handshake failure. The connection is detached and closed either way.
    pub async fn run(mut self) -> Result<TunnelId, SessionError> {
        let result = match self.handshake().await {
            Ok(tunnel_id) => {
                self.state = SessionState::Active {
                    tunnel_id: tunnel_id.clone(),
                };
                let reason = self.relay_responses().await;
                tracing::info!(
                    "Agent {} for tunnel {} disconnected: {}",
                    self.connection.id(),
                    tunnel_id,
                    reason
                );
                Ok(tunnel_id)
            }
            Err(e) => {
                tracing::warn!("Handshake failed on {}: {}", self.connection.id(), e);
                Err(e)
            }
        };

        self.teardown().await;
        result
    }

    async fn handshake(&self) -> Result<TunnelId, SessionError> {
        let text = tokio::time::timeout(self.handshake_timeout, self.connection.receive())
            .await
            .map_err(|_| SessionError::HandshakeTimeout(self.handshake_timeout))??;

        let frame = apix_protocol::decode(&text)
            .map_err(|e| SessionError::MalformedHandshake(e.to_string()))?;

        let tunnel_id = match frame {
            Frame::Register {
                tunnel_id: Some(id),
            } => TunnelId::new(id),
            Frame::Register { tunnel_id: None } => {
                return Err(SessionError::MalformedHandshake(
                    "register frame without tunnel_id".to_string(),
                ))
            }
            other => {
                return Err(SessionError::MalformedHandshake(format!(
                    "expected register frame, got {}",
                    other.frame_type().as_str()
                )))
            }
        };
        validate_tunnel_id(&tunnel_id)
            .map_err(|e| SessionError::MalformedHandshake(e.to_string()))?;

        if let Some(previous) = self
            .registry
            .attach(tunnel_id.clone(), Arc::clone(&self.connection))
        {
            tracing::info!(
                "Connection {} superseded by {} for tunnel {}",
                previous.id(),
                self.connection.id(),
                tunnel_id
            );
        }
        Ok(tunnel_id)
    }

    /// Read frames until the connection fails, returning the failure
    async fn relay_responses(&self) -> ConnectionError {
        loop {
            let text = match self.connection.receive().await {
                Ok(text) => text,
                Err(e) => return e,
            };

            match apix_protocol::decode(&text) {
                Ok(Frame::Response { payload }) => {
                    let id = payload.id.clone();
                    if !self.pending.resolve(&id, payload) {
                        tracing::debug!("Discarding late response {}", id);
                    }
                }
                Ok(other) => {
                    tracing::debug!(
                        "Ignoring {} frame from agent {}",
                        other.frame_type().as_str(),
                        self.connection.id()
                    );
                }
                Err(e) => {
                    tracing::debug!(
                        "Ignoring malformed frame from agent {}: {}",
                        self.connection.id(),
                        e
                    );
                }
            }
        }
    }

    async fn teardown(&mut self) {
        self.registry.detach(self.connection.id());
        if let Err(e) = self.connection.close().await {
            tracing::debug!("Close on {} failed: {}", self.connection.id(), e);
        }
        self.state = SessionState::Closed;
    }
}
