//! Behaviour shared by every `Limiter` implementation, exercised from each
//! implementation's tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::backend::{Limiter, RateLimited};
use super::clock::{Clock, ManualClock};
use super::ledger::LimiterSettings;

/// Ten requests per millisecond with a one millisecond backoff.
pub(crate) fn settings() -> LimiterSettings {
    LimiterSettings::new(10, Duration::from_millis(1), Duration::from_millis(1))
}

pub(crate) fn first_request_admitted<L: Limiter>(limiter: &L) {
    assert_eq!(limiter.admit("fresh"), Ok(()));
    assert!(!limiter.is_blacklisted("fresh"));
}

pub(crate) fn budget_then_blacklist<L: Limiter>(limiter: &L) {
    for i in 0..10 {
        assert!(limiter.admit("ip").is_ok(), "request {} should be admitted", i + 1);
    }

    assert_eq!(limiter.admit("ip"), Err(RateLimited));
    assert!(limiter.is_blacklisted("ip"));

    assert_eq!(limiter.admit("ip"), Err(RateLimited));
    assert!(limiter.is_blacklisted("ip"));
}

pub(crate) fn reference_scenario<L: Limiter>(limiter: &L, clock: &ManualClock) {
    for _ in 0..10 {
        assert!(limiter.admit("ip").is_ok());
    }

    let blocked_at = clock.now();
    assert!(limiter.admit("ip").is_err());
    assert_eq!(limiter.blacklisted("ip"), Some(blocked_at));

    // Still inside the backoff.
    assert!(limiter.admit("ip").is_err());

    clock.advance(Duration::from_millis(2));
    assert!(limiter.admit("ip").is_ok());
    assert_eq!(limiter.blacklisted("ip"), None);
}

pub(crate) fn backoff_boundary_releases<L: Limiter>(limiter: &L, clock: &ManualClock) {
    for _ in 0..11 {
        let _ = limiter.admit("ip");
    }
    assert!(limiter.is_blacklisted("ip"));

    clock.advance(Duration::from_micros(999));
    assert!(limiter.admit("ip").is_err());
    assert!(limiter.is_blacklisted("ip"));

    clock.advance(Duration::from_micros(1));
    assert!(limiter.admit("ip").is_ok());
    assert!(!limiter.is_blacklisted("ip"));
}

pub(crate) fn window_expiry_resets_budget<L: Limiter>(limiter: &L, clock: &ManualClock) {
    for _ in 0..10 {
        assert!(limiter.admit("ip").is_ok());
    }

    clock.advance(Duration::from_millis(2));
    for _ in 0..10 {
        assert!(limiter.admit("ip").is_ok());
    }
    assert!(!limiter.is_blacklisted("ip"));
}

pub(crate) fn clients_are_independent<L: Limiter>(limiter: &L) {
    for _ in 0..10 {
        assert!(limiter.admit("a").is_ok());
        assert!(limiter.admit("b").is_ok());
    }

    assert!(limiter.admit("a").is_err());
    assert!(limiter.is_blacklisted("a"));
    assert!(!limiter.is_blacklisted("b"));
    assert!(limiter.admit("c").is_ok());

    assert!(limiter.admit("b").is_err());
    assert!(limiter.is_blacklisted("b"));
}

/// Leaves exactly one tracked client ("fresh") behind.
pub(crate) fn sweep_only_drops_stale_entries<L: Limiter>(limiter: &L, clock: &ManualClock) {
    assert!(limiter.admit("old").is_ok());
    clock.advance(Duration::from_millis(2));

    assert!(limiter.admit("fresh").is_ok());
    for _ in 0..11 {
        let _ = limiter.admit("bad");
    }
    assert!(limiter.is_blacklisted("bad"));

    assert_eq!(limiter.sweep(), 2);
    assert!(limiter.is_blacklisted("bad"));
    assert_eq!(limiter.sweep(), 0);
}

pub(crate) fn concurrent_admits_respect_budget<L: Limiter>(limiter: &L, max_requests: usize) {
    let admitted = AtomicUsize::new(0);
    let rejected = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                for _ in 0..10 {
                    match limiter.admit("shared") {
                        Ok(()) => admitted.fetch_add(1, Ordering::SeqCst),
                        Err(RateLimited) => rejected.fetch_add(1, Ordering::SeqCst),
                    };
                }
            });
        }
    });

    assert_eq!(admitted.load(Ordering::SeqCst), max_requests);
    assert_eq!(rejected.load(Ordering::SeqCst), 80 - max_requests);
    assert!(limiter.is_blacklisted("shared"));
}
