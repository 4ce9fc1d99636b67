//! Per-client request ledger bookkeeping shared by the limiter variants.

use std::time::{Duration, Instant};

/// Default budget, matching a conservative public endpoint.
const DEFAULT_MAX_REQUESTS: usize = 5;
/// Default counting window.
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
/// Default cooldown after a client is blacklisted.
const DEFAULT_BACKOFF: Duration = Duration::from_secs(30);

/// Parameters fixed for the lifetime of a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterSettings {
    /// Maximum admitted requests per client within `window` before blocking.
    pub max_requests: usize,
    /// Trailing window over which requests are counted.
    pub window: Duration,
    /// Minimum time a client stays blacklisted.
    pub backoff: Duration,
}

impl LimiterSettings {
    /// Create settings from the three limiter parameters.
    pub fn new(max_requests: usize, window: Duration, backoff: Duration) -> Self {
        Self {
            max_requests,
            window,
            backoff,
        }
    }

    /// Whether a client blacklisted at `since` is still serving its backoff at `now`.
    pub(crate) fn still_blocked(&self, since: Instant, now: Instant) -> bool {
        now.saturating_duration_since(since) < self.backoff
    }
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW, DEFAULT_BACKOFF)
    }
}

/// Append `now` to an existing ledger, drop timestamps older than the window
/// and report whether the client went over budget.
///
/// On overflow the ledger is cleared; the caller is responsible for
/// blacklisting the client.
pub(crate) fn record(timestamps: &mut Vec<Instant>, now: Instant, settings: &LimiterSettings) -> bool {
    timestamps.push(now);
    timestamps.retain(|&t| now.saturating_duration_since(t) <= settings.window);

    if timestamps.len() > settings.max_requests {
        timestamps.clear();
        return true;
    }
    false
}

/// Whether a ledger carries nothing that the next `admit` would still count.
pub(crate) fn is_stale(timestamps: &[Instant], now: Instant, window: Duration) -> bool {
    timestamps
        .iter()
        .all(|&t| now.saturating_duration_since(t) > window)
}
