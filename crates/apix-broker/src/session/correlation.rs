//! Pending request tracker
//!
//! Routes response frames arriving on an agent connection back to the
//! HTTP handler waiting on them.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::oneshot;

use apix_core::error::DispatchError;
use apix_protocol::{RequestId, ResponseFrame};

/// Requests sent to agents that are still awaiting a response
pub struct PendingRequests {
    requests: DashMap<RequestId, oneshot::Sender<ResponseFrame>>,
}

impl PendingRequests {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self {
            requests: DashMap::new(),
        }
    }

    /// Open a slot for a request ID.
    ///
    /// Returns the receiver the response will be delivered on. Fails if a
    /// slot with the same ID is already open.
    pub fn create(
        &self,
        id: RequestId,
    ) -> Result<oneshot::Receiver<ResponseFrame>, DispatchError> {
        match self.requests.entry(id) {
            Entry::Occupied(entry) => Err(DispatchError::DuplicateRequestId(
                entry.key().to_string(),
            )),
            Entry::Vacant(entry) => {
                let (tx, rx) = oneshot::channel();
                tracing::trace!("Opened pending request {}", entry.key());
                entry.insert(tx);
                Ok(rx)
            }
        }
    }

    /// Deliver a response to its waiting slot.
    ///
    /// Returns `false` if no slot is open for the ID (late or duplicate
    /// response) or the waiter has gone away.
    pub fn resolve(&self, id: &RequestId, response: ResponseFrame) -> bool {
        match self.requests.remove(id) {
            Some((_, tx)) => {
                if tx.send(response).is_err() {
                    tracing::debug!("Waiter for request {} already gone", id);
                    return false;
                }
                true
            }
            None => {
                tracing::debug!("No pending request for response {}", id);
                false
            }
        }
    }

    /// Close a slot without delivering a response
    pub fn remove(&self, id: &RequestId) -> bool {
        self.requests.remove(id).is_some()
    }

    /// Number of open slots
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Check if no requests are pending
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}
