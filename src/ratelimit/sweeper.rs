//! Background ledger sweeping for memory bounding.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::backend::Limiter;

/// Spawn a task that periodically drops stale ledger entries.
///
/// Only entries without any in-window timestamp are removed, so the task
/// never changes what a later `admit` decides. Abort the returned handle to
/// stop it.
pub fn spawn_sweeper<L: Limiter + 'static>(limiter: Arc<L>, every: Duration) -> JoinHandle<()> {
    info!(interval = ?every, "Starting ledger sweeper");

    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = limiter.sweep();
            if removed > 0 {
                debug!(removed = removed, "Swept stale ledger entries");
            }
        }
    })
}
