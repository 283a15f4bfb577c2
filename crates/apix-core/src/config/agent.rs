//! Agent configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Configuration for the tunnel agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Broker base URL (e.g. `http://broker.example.com:8000`)
    pub server_url: String,

    /// Base URL of the local service requests are forwarded to
    pub local_url: String,

    /// Requested tunnel name; a random ID is assigned when unset
    pub username: Option<String>,

    /// Tunnel lifetime requested at registration
    pub ttl_seconds: i64,

    /// Delay policy between reconnection attempts
    pub reconnect: BackoffConfig,

    /// Timeout for each call to the local service
    #[serde(with = "duration_secs")]
    pub local_timeout: Duration,

    /// Timeout for establishing the broker connection
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".to_string(),
            local_url: "http://127.0.0.1:8080".to_string(),
            username: None,
            ttl_seconds: 21600,
            reconnect: BackoffConfig::default(),
            local_timeout: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl AgentConfig {
    /// WebSocket URL of the broker's `/ws` endpoint
    pub fn ws_url(&self) -> String {
        let base = self.server_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}/ws", base)
    }
}

/// Reconnection delay policy.
///
/// The default is a fixed 5 second delay (`multiplier = 1.0`, no jitter).
/// Raising `multiplier` above 1.0 turns it into exponential backoff capped
/// at `max`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Initial delay
    #[serde(with = "duration_secs")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration_secs")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(5),
            max: Duration::from_secs(5),
            multiplier: 1.0,
            jitter: 0.0,
        }
    }
}
