//! Broker configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Configuration for the broker daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Address to bind the HTTP server to
    pub bind_address: String,

    /// Public base URL used to build tunnel URLs (e.g. `https://tunnels.example.com`).
    ///
    /// When unset, the `Host` header of the registration request is used.
    pub public_url: Option<String>,

    /// How long a proxied request waits for the agent's response
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,

    /// How long a new connection may take to send its registration frame
    #[serde(with = "duration_secs")]
    pub handshake_timeout: Duration,

    /// TTL for tunnels registered without an explicit TTL, including
    /// tunnels created implicitly by an agent handshake
    #[serde(with = "duration_secs")]
    pub default_ttl: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            public_url: None,
            request_timeout: Duration::from_secs(60),
            handshake_timeout: Duration::from_secs(10),
            default_ttl: Duration::from_secs(6 * 60 * 60),
        }
    }
}

impl BrokerConfig {
    /// Public URL for a tunnel, given the host the client used to reach us
    pub fn tunnel_url(&self, host: Option<&str>, tunnel_id: &str) -> String {
        let base = match (&self.public_url, host) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, Some(host)) => format!("http://{}", host),
            (None, None) => format!("http://{}", self.bind_address),
        };
        format!("{}/{}", base, tunnel_id)
    }
}
