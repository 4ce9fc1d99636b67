//! Core rate limiter implementation.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use super::backend::{Limiter, RateLimited};
use super::clock::{Clock, SystemClock};
use super::ledger::{self, LimiterSettings};

/// The reference rate limiter.
///
/// Every `admit` runs under one exclusive lock, so decisions for all clients
/// are serialized. The blacklist sits behind its own read/write lock so that
/// lookups from outside `admit` can run concurrently with each other.
pub struct RateLimiter<C: Clock = SystemClock> {
    /// Recent request timestamps indexed by client identifier
    ledger: Mutex<HashMap<String, Vec<Instant>>>,
    /// Blacklisted clients and the instant they were blocked
    blacklist: RwLock<HashMap<String, Instant>>,
    settings: LimiterSettings,
    clock: C,
}

impl RateLimiter {
    /// Create a new rate limiter driven by the system clock.
    pub fn new(settings: LimiterSettings) -> Self {
        Self::with_clock(settings, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a new rate limiter driven by the given clock.
    pub fn with_clock(settings: LimiterSettings, clock: C) -> Self {
        Self {
            ledger: Mutex::new(HashMap::new()),
            blacklist: RwLock::new(HashMap::new()),
            settings,
            clock,
        }
    }

    /// The parameters this limiter was built with.
    pub fn settings(&self) -> &LimiterSettings {
        &self.settings
    }

    /// Record a request for `client_id` and decide whether to admit it.
    ///
    /// A blacklisted client is rejected until `backoff` has elapsed; the call
    /// that observes the expiry releases the client and is then counted like
    /// any other request.
    pub fn admit(&self, client_id: &str) -> Result<(), RateLimited> {
        let mut requests = self.ledger.lock();
        let now = self.clock.now();

        if let Some(since) = self.blacklisted(client_id) {
            if self.settings.still_blocked(since, now) {
                trace!(client = %client_id, "Rejected during backoff");
                return Err(RateLimited);
            }
            self.unblock(client_id);
            debug!(client = %client_id, "Backoff elapsed, client released");
        }

        let Some(timestamps) = requests.get_mut(client_id) else {
            requests.insert(client_id.to_owned(), vec![now]);
            trace!(client = %client_id, "First request admitted");
            return Ok(());
        };

        if ledger::record(timestamps, now, &self.settings) {
            self.block(client_id, now);
            debug!(
                client = %client_id,
                max_requests = self.settings.max_requests,
                window = ?self.settings.window,
                "Budget exceeded, client blacklisted"
            );
            return Err(RateLimited);
        }

        trace!(client = %client_id, count = timestamps.len(), "Request admitted");
        Ok(())
    }

    /// When `client_id` was blacklisted, if it currently is.
    ///
    /// This is a pure lookup and never changes limiter state.
    pub fn blacklisted(&self, client_id: &str) -> Option<Instant> {
        self.blacklist.read().get(client_id).copied()
    }

    /// Whether `client_id` currently has a blacklist entry.
    pub fn is_blacklisted(&self, client_id: &str) -> bool {
        self.blacklisted(client_id).is_some()
    }

    /// Number of requests counted for `client_id` at its last recomputation.
    pub fn in_window_count(&self, client_id: &str) -> usize {
        self.ledger.lock().get(client_id).map_or(0, Vec::len)
    }

    /// Number of clients with a ledger entry.
    pub fn tracked_clients(&self) -> usize {
        self.ledger.lock().len()
    }

    /// Number of clients currently blacklisted.
    pub fn blacklisted_clients(&self) -> usize {
        self.blacklist.read().len()
    }

    /// Drop ledger entries that hold no in-window timestamps.
    ///
    /// Blacklist entries are left alone; they are only released by `admit`.
    pub fn sweep(&self) -> usize {
        let mut requests = self.ledger.lock();
        let now = self.clock.now();
        let before = requests.len();
        requests.retain(|_, timestamps| !ledger::is_stale(timestamps, now, self.settings.window));
        before - requests.len()
    }

    /// Clear all ledger and blacklist state.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        let mut requests = self.ledger.lock();
        requests.clear();
        self.blacklist.write().clear();
    }

    fn block(&self, client_id: &str, at: Instant) {
        self.blacklist.write().insert(client_id.to_owned(), at);
    }

    fn unblock(&self, client_id: &str) {
        self.blacklist.write().remove(client_id);
    }
}

impl<C: Clock> Limiter for RateLimiter<C> {
    fn admit(&self, client_id: &str) -> Result<(), RateLimited> {
        RateLimiter::<C>::admit(self, client_id)
    }

    fn blacklisted(&self, client_id: &str) -> Option<Instant> {
        RateLimiter::<C>::blacklisted(self, client_id)
    }

    fn sweep(&self) -> usize {
        RateLimiter::<C>::sweep(self)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(LimiterSettings::default())
    }
}
