//! HTTP front for the rate limiter.

mod server;
mod service;

pub use server::HttpServer;
pub use service::{router, BlacklistStatus};
