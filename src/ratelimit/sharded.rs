//! Rate limiter with per-client locking.
//!
//! Decisions for the same client are serialized through the ledger shard
//! that owns the client, while unrelated clients proceed in parallel.

use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::backend::{Limiter, RateLimited};
use super::clock::{Clock, SystemClock};
use super::ledger::{self, LimiterSettings};

/// A rate limiter whose exclusive lock is sharded by client identifier.
pub struct ShardedRateLimiter<C: Clock = SystemClock> {
    ledger: DashMap<String, Vec<Instant>>,
    blacklist: DashMap<String, Instant>,
    settings: LimiterSettings,
    clock: C,
}

impl ShardedRateLimiter {
    /// Create a new sharded rate limiter driven by the system clock.
    pub fn new(settings: LimiterSettings) -> Self {
        Self::with_clock(settings, SystemClock)
    }
}

impl<C: Clock> ShardedRateLimiter<C> {
    /// Create a new sharded rate limiter driven by the given clock.
    pub fn with_clock(settings: LimiterSettings, clock: C) -> Self {
        Self {
            ledger: DashMap::new(),
            blacklist: DashMap::new(),
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
    /// The ledger entry for the client stays locked for the whole call, so
    /// the blacklist check, release and recount are one step per client.
    pub fn admit(&self, client_id: &str) -> Result<(), RateLimited> {
        let entry = self.ledger.entry(client_id.to_owned());
        let now = self.clock.now();

        if let Some(since) = self.blacklisted(client_id) {
            if self.settings.still_blocked(since, now) {
                trace!(client = %client_id, "Rejected during backoff");
                return Err(RateLimited);
            }
            self.blacklist.remove(client_id);
            debug!(client = %client_id, "Backoff elapsed, client released");
        }

        let mut occupied = match entry {
            Entry::Vacant(vacant) => {
                vacant.insert(vec![now]);
                trace!(client = %client_id, "First request admitted");
                return Ok(());
            }
            Entry::Occupied(occupied) => occupied,
        };

        if ledger::record(occupied.get_mut(), now, &self.settings) {
            self.blacklist.insert(client_id.to_owned(), now);
            debug!(
                client = %client_id,
                max_requests = self.settings.max_requests,
                window = ?self.settings.window,
                "Budget exceeded, client blacklisted"
            );
            return Err(RateLimited);
        }

        trace!(client = %client_id, count = occupied.get().len(), "Request admitted");
        Ok(())
    }

    /// When `client_id` was blacklisted, if it currently is.
    pub fn blacklisted(&self, client_id: &str) -> Option<Instant> {
        self.blacklist.get(client_id).map(|since| *since)
    }

    /// Whether `client_id` currently has a blacklist entry.
    pub fn is_blacklisted(&self, client_id: &str) -> bool {
        self.blacklist.contains_key(client_id)
    }

    /// Number of requests counted for `client_id` at its last recomputation.
    pub fn in_window_count(&self, client_id: &str) -> usize {
        self.ledger.get(client_id).map_or(0, |timestamps| timestamps.len())
    }

    /// Number of clients with a ledger entry.
    pub fn tracked_clients(&self) -> usize {
        self.ledger.len()
    }

    /// Number of clients currently blacklisted.
    pub fn blacklisted_clients(&self) -> usize {
        self.blacklist.len()
    }

    /// Drop ledger entries that hold no in-window timestamps.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let window = self.settings.window;
        let before = self.ledger.len();
        self.ledger
            .retain(|_, timestamps| !ledger::is_stale(timestamps, now, window));
        before.saturating_sub(self.ledger.len())
    }

    /// Clear all ledger and blacklist state.
    pub fn clear(&self) {
        self.ledger.clear();
        self.blacklist.clear();
    }
}

impl<C: Clock> Limiter for ShardedRateLimiter<C> {
    fn admit(&self, client_id: &str) -> Result<(), RateLimited> {
        ShardedRateLimiter::<C>::admit(self, client_id)
    }

    fn blacklisted(&self, client_id: &str) -> Option<Instant> {
        ShardedRateLimiter::<C>::blacklisted(self, client_id)
    }

    fn sweep(&self) -> usize {
        ShardedRateLimiter::<C>::sweep(self)
    }
}

impl Default for ShardedRateLimiter {
    fn default() -> Self {
        Self::new(LimiterSettings::default())
    }
}
