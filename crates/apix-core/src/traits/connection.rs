//! Connection traits

use async_trait::async_trait;

use crate::error::ConnectionError;
use crate::types::ConnectionId;
use apix_protocol::Frame;

/// A bidirectional, message-oriented, ordered connection between the broker
/// and an agent.
///
/// Implementations must allow `send` to be called concurrently from several
/// tasks while one task sits in `receive`.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Identity of this connection, stable for its lifetime
    fn id(&self) -> ConnectionId;

    /// Send one text message
    async fn send(&self, text: String) -> Result<(), ConnectionError>;

    /// Wait for the next text message.
    ///
    /// Returns `ConnectionError::Closed` once the peer has closed the
    /// connection or it was closed locally.
    async fn receive(&self) -> Result<String, ConnectionError>;

    /// Close the connection
    async fn close(&self) -> Result<(), ConnectionError>;

    /// Encode and send a frame
    async fn send_frame(&self, frame: &Frame) -> Result<(), ConnectionError> {
        let text = apix_protocol::encode(frame)?;
        self.send(text).await
    }
}
