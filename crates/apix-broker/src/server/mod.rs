//! HTTP front end

mod listener;
mod routes;

pub use listener::HttpServer;
pub use routes::{
    router, HealthResponse, RandomRequest, RegisterRequest, RegisterResponse, TunnelSummary,
};
