//! Request dispatch
//!
//! Turns an inbound public HTTP request into a request frame on the
//! tunnel's agent connection and waits for the matching response frame.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use apix_core::error::DispatchError;
use apix_core::TunnelId;
use apix_protocol::{Frame, Headers, RequestFrame, RequestId, ResponseFrame};

use crate::connection::TunnelRegistry;
use crate::gateway::rewrite::rewrite_docs_body;
use crate::session::PendingRequests;

/// Response headers describing the agent-side transfer, recomputed by the
/// HTTP layer
pub const HOP_BY_HOP_RESPONSE_HEADERS: &[&str] =
    &["connection", "keep-alive", "transfer-encoding", "content-length"];

/// A public HTTP request addressed to a tunnel
#[derive(Debug, Clone)]
pub struct InboundRequest {
    /// HTTP method
    pub method: String,
    /// Path after the tunnel prefix, without a leading slash
    pub path: String,
    /// Raw query string
    pub query: Option<String>,
    /// Request headers, in arrival order
    pub headers: Headers,
    /// Request body
    pub body: Bytes,
}

/// Response returned to the public caller
#[derive(Debug, Clone)]
pub struct OutboundResponse {
    /// HTTP status
    pub status: u16,
    /// Response headers
    pub headers: Headers,
    /// Response body
    pub body: Bytes,
}

impl OutboundResponse {
    /// Plain-text error response
    pub fn error(status: u16, message: &str) -> Self {
        let mut headers = Headers::new();
        headers.append("content-type", "text/plain; charset=utf-8");
        Self {
            status,
            headers,
            body: Bytes::copy_from_slice(message.as_bytes()),
        }
    }
}

/// Closes the pending slot when the dispatch finishes or is abandoned
struct PendingSlot<'a> {
    pending: &'a PendingRequests,
    id: RequestId,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

/// Forwards public requests to tunnel agents
pub struct Gateway {
    registry: Arc<TunnelRegistry>,
    pending: Arc<PendingRequests>,
    request_timeout: Duration,
}

impl Gateway {
    /// Create a gateway over the shared registry and pending table
    pub fn new(
        registry: Arc<TunnelRegistry>,
        pending: Arc<PendingRequests>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            pending,
            request_timeout,
        }
    }

    /// Dispatch a request and produce the response for the public caller.
    ///
    /// Failures map to 502 when the tunnel has no agent and 504 otherwise.
    pub async fn dispatch(&self, tunnel_id: &TunnelId, request: InboundRequest) -> OutboundResponse {
        let method = request.method.clone();
        let path = request.path.clone();

        match self.forward(tunnel_id, request).await {
            Ok(response) => {
                tracing::debug!(
                    "{} /{}/{} -> {}",
                    method,
                    tunnel_id,
                    path,
                    response.status
                );
                translate_response(tunnel_id, &path, response)
            }
            Err(e) => {
                tracing::warn!("{} /{}/{} failed: {}", method, tunnel_id, path, e);
                OutboundResponse::error(e.status_code(), e.public_message())
            }
        }
    }

    /// Send a request frame to the tunnel's agent and await its response
    pub async fn forward(
        &self,
        tunnel_id: &TunnelId,
        request: InboundRequest,
    ) -> Result<ResponseFrame, DispatchError> {
        let connection = self
            .registry
            .lookup(tunnel_id)
            .ok_or_else(|| DispatchError::TunnelNotConnected(tunnel_id.to_string()))?;

        let id = RequestId::generate();
        let receiver = self.pending.create(id.clone())?;
        let _slot = PendingSlot {
            pending: &self.pending,
            id: id.clone(),
        };

        let frame = Frame::Request {
            payload: RequestFrame {
                id,
                method: request.method,
                path: normalize_path(&request.path),
                query: request.query.filter(|q| !q.is_empty()),
                headers: request.headers,
                body: request.body,
            },
        };
        connection
            .send_frame(&frame)
            .await
            .map_err(DispatchError::SendFailed)?;

        match tokio::time::timeout(self.request_timeout, receiver).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(DispatchError::ResponseDropped),
            Err(_) => Err(DispatchError::RequestTimeout(self.request_timeout)),
        }
    }
}

/// Path sent to the agent, always rooted
fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

fn translate_response(tunnel_id: &TunnelId, path: &str, response: ResponseFrame) -> OutboundResponse {
    if !(100..=999).contains(&response.status) {
        tracing::warn!(
            "Agent for {} returned invalid status {}",
            tunnel_id,
            response.status
        );
        return OutboundResponse::error(502, "invalid response from tunnel");
    }

    let headers = response.headers.without(HOP_BY_HOP_RESPONSE_HEADERS);
    let body = rewrite_docs_body(tunnel_id, path, headers.get("content-type"), response.body);
    OutboundResponse {
        status: response.status,
        headers,
        body,
    }
}
