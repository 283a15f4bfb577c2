//! apix-core: Core abstractions and configuration for apix-bridge
//!
//! This crate provides shared types, the connection trait, error taxonomy
//! and configuration structures used by the broker and the agent.

pub mod config;
pub mod error;
pub mod memory;
pub mod traits;
pub mod types;

pub use traits::Connection;
pub use types::{ConnectionId, TunnelId};
