//! Core error types for apix-bridge

use apix_protocol::ProtocolError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Transport-level errors on a single connection
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Peer closed the connection, or it was closed locally
    #[error("Connection closed")]
    Closed,

    /// Sending a message failed
    #[error("Send failed: {0}")]
    Send(String),

    /// Receiving a message failed
    #[error("Receive failed: {0}")]
    Receive(String),

    /// A frame could not be encoded
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Tunnel registry errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// Caller supplied an unusable TTL or tunnel ID
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Errors while dispatching an inbound request to a tunnel
#[derive(Error, Debug)]
pub enum DispatchError {
    /// No live connection for the tunnel
    #[error("Tunnel not connected: {0}")]
    TunnelNotConnected(String),

    /// No response arrived within the deadline
    #[error("Request timed out after {0:?}")]
    RequestTimeout(Duration),

    /// A pending request with this ID already exists
    #[error("Duplicate request ID: {0}")]
    DuplicateRequestId(String),

    /// The request frame could not be sent to the agent
    #[error("Failed to send request: {0}")]
    SendFailed(#[source] ConnectionError),

    /// The pending slot was dropped without a response
    #[error("Response slot dropped")]
    ResponseDropped,
}

impl DispatchError {
    /// HTTP status reported to the caller for this error
    pub fn status_code(&self) -> u16 {
        match self {
            DispatchError::TunnelNotConnected(_) => 502,
            _ => 504,
        }
    }

    /// Plain-text body reported to the caller for this error
    pub fn public_message(&self) -> &'static str {
        match self {
            DispatchError::TunnelNotConnected(_) => "tunnel not connected",
            _ => "client error or timeout",
        }
    }
}

/// Broker connection session errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// The first frame was not a valid registration
    #[error("Malformed handshake: {0}")]
    MalformedHandshake(String),

    /// No registration frame arrived in time
    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// The connection failed
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_status_codes() {
        assert_eq!(
            DispatchError::TunnelNotConnected("abc".into()).status_code(),
            502
        );
        assert_eq!(
            DispatchError::RequestTimeout(Duration::from_secs(60)).status_code(),
            504
        );
        assert_eq!(
            DispatchError::SendFailed(ConnectionError::Closed).status_code(),
            504
        );
        assert_eq!(DispatchError::ResponseDropped.status_code(), 504);
    }

    #[test]
    fn test_public_messages() {
        assert_eq!(
            DispatchError::TunnelNotConnected("abc".into()).public_message(),
            "tunnel not connected"
        );
        assert_eq!(
            DispatchError::ResponseDropped.public_message(),
            "client error or timeout"
        );
    }
}
