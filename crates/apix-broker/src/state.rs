//! Global broker state

use std::sync::Arc;

use apix_core::config::BrokerConfig;
use apix_core::Connection;

use crate::connection::TunnelRegistry;
use crate::gateway::Gateway;
use crate::session::{BrokerSession, PendingRequests};

/// Shared state for the broker daemon
pub struct BrokerState {
    /// Configuration
    pub config: BrokerConfig,
    /// Tunnel registry
    pub registry: Arc<TunnelRegistry>,
    /// Requests awaiting agent responses
    pub pending: Arc<PendingRequests>,
    gateway: Gateway,
}

impl BrokerState {
    /// Create broker state from configuration
    pub fn new(config: BrokerConfig) -> Self {
        let registry = Arc::new(TunnelRegistry::new(config.default_ttl));
        let pending = Arc::new(PendingRequests::new());
        let gateway = Gateway::new(
            Arc::clone(&registry),
            Arc::clone(&pending),
            config.request_timeout,
        );
        Self {
            config,
            registry,
            pending,
            gateway,
        }
    }

    /// Get the request gateway
    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Start a session for a newly accepted agent connection
    pub fn session(&self, connection: Arc<dyn Connection>) -> BrokerSession {
        BrokerSession::new(
            connection,
            Arc::clone(&self.registry),
            Arc::clone(&self.pending),
            self.config.handshake_timeout,
        )
    }
}
