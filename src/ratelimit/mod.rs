//! Rate limiting logic and state management.

mod backend;
mod clock;
mod ledger;
mod limiter;
mod sharded;
mod sweeper;

#[cfg(test)]
mod conformance;

pub use backend::{Limiter, RateLimited};
pub use clock::{Clock, ManualClock, SystemClock};
pub use ledger::LimiterSettings;
pub use limiter::RateLimiter;
pub use sharded::ShardedRateLimiter;
pub use sweeper::spawn_sweeper;
