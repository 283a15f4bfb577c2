//! HTTP routes
//!
//! Registration and status endpoints, the agent WebSocket upgrade, and the
//! catch-all tunnel proxy.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::HOST;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use apix_core::{Connection, TunnelId};
use apix_protocol::{Headers, MAX_FRAME_SIZE};

use crate::connection::WsConnection;
use crate::gateway::{InboundRequest, OutboundResponse};
use crate::state::BrokerState;

/// Body of `POST /register`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    /// Requested tunnel name; empty or missing means a random ID
    pub username: Option<String>,
    /// Tunnel lifetime
    pub ttl_seconds: Option<i64>,
}

/// Body of `POST /random`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RandomRequest {
    /// Tunnel lifetime
    pub ttl_seconds: Option<i64>,
}

/// Successful registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    /// Assigned tunnel ID
    pub tunnel_id: String,
    /// URL the tunnel is reachable at
    pub public_url: String,
}

/// `GET /health` body
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"`
    pub status: String,
    /// Registered tunnels, including ones awaiting lazy expiry
    pub tunnels: usize,
    /// Tunnels with an attached agent
    pub connected: usize,
    /// Requests awaiting agent responses
    pub pending_requests: usize,
}

/// One entry of `GET /tunnels`
#[derive(Debug, Serialize, Deserialize)]
pub struct TunnelSummary {
    /// Tunnel ID
    pub tunnel_id: String,
    /// Whether an agent is attached
    pub connected: bool,
    /// Seconds until the tunnel expires
    pub expires_in_secs: u64,
}

/// Build the broker router
pub fn router(state: Arc<BrokerState>) -> Router {
    Router::new()
        .route("/register", post(register_tunnel))
        .route("/random", post(random_tunnel))
        .route("/health", get(health))
        .route("/tunnels", get(list_tunnels))
        .route("/ws", get(agent_upgrade))
        .fallback(proxy)
        .layer(DefaultBodyLimit::max(MAX_FRAME_SIZE))
        .with_state(state)
}

fn bad_request(message: impl std::fmt::Display) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message.to_string() })),
    )
        .into_response()
}

/// Parse an optional JSON body; an empty body means all defaults
fn parse_body<T: Default + serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| bad_request(format!("invalid request body: {}", e)))
}

fn host(headers: &HeaderMap) -> Option<&str> {
    headers.get(HOST).and_then(|value| value.to_str().ok())
}

fn registered(
    state: &BrokerState,
    headers: &HeaderMap,
    requested: Option<TunnelId>,
    ttl_seconds: Option<i64>,
) -> Response {
    let ttl_seconds = ttl_seconds
        .unwrap_or_else(|| i64::try_from(state.config.default_ttl.as_secs()).unwrap_or(i64::MAX));
    match state.registry.register(requested, ttl_seconds) {
        Ok(tunnel_id) => Json(RegisterResponse {
            public_url: state.config.tunnel_url(host(headers), tunnel_id.as_str()),
            tunnel_id: tunnel_id.to_string(),
        })
        .into_response(),
        Err(e) => bad_request(e),
    }
}

async fn register_tunnel(
    State(state): State<Arc<BrokerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: RegisterRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let requested = request.username.as_deref().and_then(TunnelId::from_username);
    registered(&state, &headers, requested, request.ttl_seconds)
}

async fn random_tunnel(
    State(state): State<Arc<BrokerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: RandomRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    registered(&state, &headers, None, request.ttl_seconds)
}

async fn health(State(state): State<Arc<BrokerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        tunnels: state.registry.len(),
        connected: state.registry.connected_count(),
        pending_requests: state.pending.len(),
    })
}

async fn list_tunnels(State(state): State<Arc<BrokerState>>) -> Json<Vec<TunnelSummary>> {
    Json(
        state
            .registry
            .snapshot()
            .into_iter()
            .map(|info| TunnelSummary {
                tunnel_id: info.tunnel_id.to_string(),
                connected: info.connected,
                expires_in_secs: info.expires_in.as_secs(),
            })
            .collect(),
    )
}

async fn agent_upgrade(
    State(state): State<Arc<BrokerState>>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade
        .max_message_size(MAX_FRAME_SIZE)
        .on_upgrade(move |socket| async move {
            let connection: Arc<dyn Connection> = Arc::new(WsConnection::new(socket));
            tracing::info!("Agent connected: {}", connection.id());
            match state.session(connection).run().await {
                Ok(tunnel_id) => tracing::debug!("Session for tunnel {} ended", tunnel_id),
                Err(e) => tracing::debug!("Session ended before registration: {}", e),
            }
        })
}

/// Split `/<tunnel_id>/<rest>` into the tunnel ID and the remaining path
fn split_tunnel_path(path: &str) -> Option<(TunnelId, &str)> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let (tunnel_id, rest) = match trimmed.split_once('/') {
        Some((tunnel_id, rest)) => (tunnel_id, rest),
        None => (trimmed, ""),
    };
    if tunnel_id.is_empty() {
        None
    } else {
        Some((TunnelId::new(tunnel_id), rest))
    }
}

fn collect_headers(headers: &HeaderMap) -> Headers {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                Headers::decode_value(value.as_bytes()),
            )
        })
        .collect()
}

async fn proxy(
    State(state): State<Arc<BrokerState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some((tunnel_id, path)) = split_tunnel_path(uri.path()) else {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    };

    let request = InboundRequest {
        method: method.to_string(),
        path: path.to_string(),
        query: uri.query().map(str::to_string),
        headers: collect_headers(&headers),
        body,
    };
    into_response(state.gateway().dispatch(&tunnel_id, request).await)
}

fn into_response(outbound: OutboundResponse) -> Response {
    let status = StatusCode::from_u16(outbound.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = Response::new(Body::from(outbound.body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (name, value) in outbound.headers.iter() {
        let value = Headers::encode_value(value)
            .and_then(|raw| HeaderValue::from_bytes(&raw).ok());
        match (HeaderName::from_bytes(name.as_bytes()), value) {
            (Ok(name), Some(value)) => {
                headers.append(name, value);
            }
            _ => tracing::debug!("Skipping invalid response header {:?}", name),
        }
    }
    response
}
