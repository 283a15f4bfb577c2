//! apix-broker: Public tunnel broker
//!
//! The broker accepts public HTTP requests addressed to `/<tunnel_id>/...`
//! and relays each one as a request frame over the WebSocket connection of
//! the agent serving that tunnel. Agents reach the broker on `/ws` and
//! register a tunnel ID in their first frame.

pub mod connection;
pub mod gateway;
pub mod server;
pub mod session;
pub mod state;

pub use state::BrokerState;
