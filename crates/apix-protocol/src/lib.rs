//! apix-protocol: Wire protocol for apix-bridge tunnels
//!
//! This crate defines the JSON frames exchanged between the broker and
//! agents over a single persistent WebSocket connection.

pub mod codec;
pub mod error;
pub mod headers;
pub mod message;
pub mod request_id;

pub use codec::{decode, encode, MAX_FRAME_SIZE};
pub use error::ProtocolError;
pub use headers::Headers;
pub use message::{Frame, FrameType, RequestFrame, ResponseFrame};
pub use request_id::RequestId;
