//! Limiter trait for abstracting the global-lock and sharded implementations.

use std::time::Instant;

use thiserror::Error;

/// Rejection returned when a request must not be admitted.
///
/// Covers both an unexpired backoff and a fresh overflow of the budget;
/// callers that need to tell them apart can inspect
/// [`Limiter::blacklisted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rate limited")]
pub struct RateLimited;

/// Trait for rate limiter implementations.
///
/// This trait abstracts over both the single-lock `RateLimiter` and the
/// `ShardedRateLimiter` to allow the HTTP layer to work with either.
pub trait Limiter: Send + Sync {
    /// Record a request for `client_id` and decide whether to admit it.
    fn admit(&self, client_id: &str) -> Result<(), RateLimited>;

    /// When `client_id` was blacklisted, if it currently is.
    fn blacklisted(&self, client_id: &str) -> Option<Instant>;

    /// Whether `client_id` currently has a blacklist entry.
    fn is_blacklisted(&self, client_id: &str) -> bool {
        self.blacklisted(client_id).is_some()
    }

    /// Drop ledger entries that hold no in-window timestamps.
    ///
    /// Returns the number of entries removed.
    fn sweep(&self) -> usize;
}
