//! Tunnel management for connecting to the broker

mod connector;
mod reconnect;

pub use connector::{ConnectError, TunnelConnector, WsClientConnection};
pub use reconnect::ExponentialBackoff;
