//! Periodic background work: stale client eviction and resolved-group collection.

use gts_cache::HashCache;
use gts_coordinator::ProducerRegistry;
use gts_store::GarbageCollector;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// Evicts registrations idle for longer than `max_idle`, every `every`.
pub fn spawn_registry_sweeper(
    registry: ProducerRegistry,
    every: Duration,
    max_idle: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let expired = registry.scan_inactive(max_idle);
                    if !expired.is_empty() {
                        info!(count = expired.len(), remaining = registry.len(), "Evicted stale producers");
                    }
                },
                _ = stop.changed() => break,
            }
        }
        debug!("Registry sweeper stopped");
    })
}

/// Runs [`GarbageCollector::sweep`] every `every`. A failed sweep is logged and retried next tick.
pub fn spawn_garbage_collector<C: HashCache>(
    collector: GarbageCollector<C>,
    every: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so a restart does not sweep at once.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = collector.sweep().await {
                        warn!(error = %err, "Garbage collection sweep failed");
                    }
                },
                _ = stop.changed() => break,
            }
        }
        debug!("Garbage collector stopped");
    })
}
