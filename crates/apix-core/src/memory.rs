//! In-process connection pair
//!
//! Two [`MemoryConnection`] ends linked by unbounded channels. Used to drive
//! broker sessions and agent loops without a network. Closing either end
//! closes both, the same way a WebSocket close is observed by both peers.

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::ConnectionError;
use crate::traits::Connection;
use crate::types::ConnectionId;

/// One end of an in-memory connection
pub struct MemoryConnection {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<String>,
    rx: Mutex<mpsc::UnboundedReceiver<String>>,
    /// Shared by both ends
    closed: CancellationToken,
}

/// Create a linked pair of connection ends
pub fn pair() -> (MemoryConnection, MemoryConnection) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    let closed = CancellationToken::new();

    let a = MemoryConnection {
        id: ConnectionId::next(),
        tx: a_tx,
        rx: Mutex::new(a_rx),
        closed: closed.clone(),
    };
    let b = MemoryConnection {
        id: ConnectionId::next(),
        tx: b_tx,
        rx: Mutex::new(b_rx),
        closed,
    };
    (a, b)
}

impl MemoryConnection {
    /// Whether either end has closed the pair
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send(&self, text: String) -> Result<(), ConnectionError> {
        if self.closed.is_cancelled() {
            return Err(ConnectionError::Closed);
        }
        self.tx.send(text).map_err(|_| ConnectionError::Closed)
    }

    async fn receive(&self) -> Result<String, ConnectionError> {
        let mut rx = self.rx.lock().await;
        tokio::select! {
            // Deliver anything sent before the close
            biased;
            message = rx.recv() => message.ok_or(ConnectionError::Closed),
            _ = self.closed.cancelled() => rx.try_recv().map_err(|_| ConnectionError::Closed),
        }
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.closed.cancel();
        Ok(())
    }
}
