//! apix-agent: Tunnel agent for apix-bridge
//!
//! The agent runs next to a private HTTP service. It registers a tunnel
//! with the broker, keeps an outbound WebSocket attached to it, and
//! replays every request frame it receives against the local service.

pub mod forwarder;
pub mod registration;
pub mod runner;
pub mod tunnel;

pub use forwarder::{ForwardError, Forwarder};
pub use registration::{register, Registration};
pub use runner::AgentRunner;
