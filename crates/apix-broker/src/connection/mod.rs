//! Agent connection management

mod registry;
mod websocket;

pub use registry::{
    validate_tunnel_id, TunnelInfo, TunnelRegistry, MAX_TUNNEL_ID_LEN, RESERVED_TUNNEL_IDS,
};
pub use websocket::WsConnection;
