//! Out-of-band tunnel registration
//!
//! Before opening its WebSocket the agent asks the broker for a tunnel ID
//! over plain HTTP: `POST /register` with the configured username, or
//! `POST /random` when none is set.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;

use apix_core::config::AgentConfig;
use apix_core::TunnelId;

/// Tunnel assigned by the broker
#[derive(Debug, Clone)]
pub struct Registration {
    /// Tunnel ID to present in the handshake
    pub tunnel_id: TunnelId,
    /// Public URL of the tunnel
    pub public_url: String,
}

#[derive(Deserialize)]
struct RegisterResponse {
    tunnel_id: String,
    public_url: String,
}

/// Register a tunnel with the broker named in `config`
pub async fn register(client: &reqwest::Client, config: &AgentConfig) -> Result<Registration> {
    let base = config.server_url.trim_end_matches('/');
    let username = config
        .username
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());

    let request = match username {
        Some(username) => client.post(format!("{}/register", base)).json(&json!({
            "username": username,
            "ttl_seconds": config.ttl_seconds,
        })),
        None => client
            .post(format!("{}/random", base))
            .json(&json!({ "ttl_seconds": config.ttl_seconds })),
    };

    let response = request
        .send()
        .await
        .with_context(|| format!("Failed to reach broker at {}", base))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("Broker rejected registration ({}): {}", status, body);
    }

    let body: RegisterResponse = response
        .json()
        .await
        .context("Invalid registration response")?;

    tracing::info!("Registered tunnel {} at {}", body.tunnel_id, body.public_url);
    Ok(Registration {
        tunnel_id: TunnelId::new(body.tunnel_id),
        public_url: body.public_url,
    })
}
