use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use crate::memory_storage::MemoryStorage;

/// Periodically evict expired entries in the background.
///
/// Every operation already evicts lazily; this only stops an idle peer from
/// holding expired entries in memory. Abort the returned handle to stop it.
/// Panics if `period` is zero.
pub fn spawn_expiration_sweeper(storage: Arc<MemoryStorage>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let evicted = storage.sweep_expired();
            if !evicted.is_empty() {
                debug!(count = evicted.len(), "Background sweep evicted expired entries");
            }
        }
    })
}
