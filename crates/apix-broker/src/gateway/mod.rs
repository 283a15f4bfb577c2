//! Public request gateway

mod dispatch;
pub mod rewrite;

pub use dispatch::{Gateway, InboundRequest, OutboundResponse, HOP_BY_HOP_RESPONSE_HEADERS};
