//! Agent sessions and request correlation

mod correlation;
mod handler;

pub use correlation::PendingRequests;
pub use handler::{BrokerSession, SessionState};
