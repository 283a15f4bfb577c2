//! Frame types for the apix-bridge protocol
//!
//! Every frame is a single JSON object carried in one WebSocket text
//! message, tagged by its `type` field.
//!
//! # Message Flow
//!
//! 1. Agent connects and sends `register` with the tunnel ID it obtained
//!    from the broker's HTTP registration endpoint
//! 2. Broker sends `request` frames for inbound HTTP traffic
//! 3. Agent answers each with a `response` frame carrying the same `id`
//!
//! Responses may arrive in any order; the `id` is the only correlation.
//! Frame types this version does not know decode as [`Frame::Unknown`] so
//! newer peers can add frame types without breaking older ones.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::headers::Headers;
use crate::request_id::RequestId;

/// Frame type identifier, used for logging and dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// Registration handshake (agent -> broker)
    Register,
    /// Proxied HTTP request (broker -> agent)
    Request,
    /// Proxied HTTP response (agent -> broker)
    Response,
    /// Any frame type not known to this version
    Unknown,
}

impl FrameType {
    /// Wire name of this frame type
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameType::Register => "register",
            FrameType::Request => "request",
            FrameType::Response => "response",
            FrameType::Unknown => "unknown",
        }
    }
}

/// Protocol frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Agent registration handshake.
    ///
    /// Must be the first frame an agent sends. A missing `tunnel_id` decodes
    /// as `None` so the broker can reject it explicitly.
    Register {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tunnel_id: Option<String>,
    },

    /// HTTP request to forward to the agent's local service
    Request { payload: RequestFrame },

    /// HTTP response for a previously sent request
    Response { payload: ResponseFrame },

    /// Frame with an unrecognised `type`
    #[serde(other)]
    Unknown,
}

impl Frame {
    /// Build a registration frame
    pub fn register(tunnel_id: impl Into<String>) -> Self {
        Frame::Register {
            tunnel_id: Some(tunnel_id.into()),
        }
    }

    /// Get the frame type
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Register { .. } => FrameType::Register,
            Frame::Request { .. } => FrameType::Request,
            Frame::Response { .. } => FrameType::Response,
            Frame::Unknown => FrameType::Unknown,
        }
    }
}

/// A proxied HTTP request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Correlation ID, echoed in the response
    pub id: RequestId,
    /// HTTP method
    pub method: String,
    /// Request path, always starting with `/`
    pub path: String,
    /// Raw query string without the leading `?`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Request headers as received by the broker
    #[serde(default)]
    pub headers: Headers,
    /// Raw request body (base64 on the wire)
    #[serde(default, with = "base64_body")]
    pub body: Bytes,
}

/// A proxied HTTP response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// ID of the request this answers
    pub id: RequestId,
    /// HTTP status code
    pub status: u16,
    /// Response headers
    #[serde(default)]
    pub headers: Headers,
    /// Raw response body (base64 on the wire)
    #[serde(default, with = "base64_body")]
    pub body: Bytes,
}

impl ResponseFrame {
    /// Create a new response frame
    pub fn new(id: RequestId, status: u16, headers: Headers, body: impl Into<Bytes>) -> Self {
        Self {
            id,
            status,
            headers,
            body: body.into(),
        }
    }

    /// Synthesized 502 response describing a failed local call
    pub fn upstream_error(id: RequestId, error: impl std::fmt::Display) -> Self {
        let headers = [("content-type", "text/plain")].into_iter().collect();
        Self::new(id, 502, headers, format!("upstream error: {}", error))
    }
}

/// Serde helper encoding body bytes as standard base64 strings
mod base64_body {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
