//! Penaltybox - per-client rate limiting with blacklist escalation
//!
//! This crate implements a request-rate limiter that tracks each client's
//! recent requests in a sliding window, blacklists clients that exceed their
//! budget and releases them once a backoff period has elapsed. A thin HTTP
//! front rejects blacklisted clients with `429 Too Many Requests`.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
