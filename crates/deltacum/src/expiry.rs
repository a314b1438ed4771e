//! Time-based eviction of idle streams.
//!
//! [`ExpiringMap`] stamps every `store` with a wall-clock last-touch time.
//! A background sweeper periodically removes entries whose last touch is
//! older than `max_stale`; a stream evicted this way starts over as a new
//! series the next time a sample for it arrives.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::identity::StreamId;
use crate::metrics::AggregatorMetrics;
use crate::shutdown::ShutdownSignal;
use crate::streams::Map;

/// Wraps a map with last-touch tracking.
///
/// Clones share the stamp table; for sweeping to work, cloning the inner
/// map must alias the same entries too (wrap it in
/// [`crate::streams::SyncMap`]). Eviction goes through the inner map's
/// write lock.
#[derive(Debug)]
pub struct ExpiringMap<M> {
    inner: M,
    stamps: Arc<Mutex<HashMap<StreamId, Instant>>>,
    max_stale: Duration,
}

impl<M: Clone> Clone for ExpiringMap<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            stamps: Arc::clone(&self.stamps),
            max_stale: self.max_stale,
        }
    }
}

impl<M> ExpiringMap<M> {
    pub fn new(inner: M, max_stale: Duration) -> Self {
        Self {
            inner,
            stamps: Arc::new(Mutex::new(HashMap::new())),
            max_stale,
        }
    }

    /// Removes every entry whose last touch is older than `max_stale`.
    /// Returns the number of evicted streams.
    pub fn sweep<T>(&mut self, now: Instant) -> usize
    where
        M: Map<T>,
    {
        let expired: Vec<StreamId> = {
            let stamps = self.stamps.lock().unwrap();
            stamps
                .iter()
                .filter(|(_, touched)| now.duration_since(**touched) > self.max_stale)
                .map(|(id, _)| *id)
                .collect()
        };
        for id in &expired {
            self.inner.delete(id);
            self.stamps.lock().unwrap().remove(id);
        }
        expired.len()
    }
}

impl<T, M: Map<T>> Map<T> for ExpiringMap<M> {
    fn load(&self, id: &StreamId) -> Option<T> {
        self.inner.load(id)
    }

    fn store(&mut self, id: StreamId, value: T) {
        self.inner.store(id, value);
        self.stamps.lock().unwrap().insert(id, Instant::now());
    }

    fn delete(&mut self, id: &StreamId) -> bool {
        self.stamps.lock().unwrap().remove(id);
        self.inner.delete(id)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn items(&self, visit: &mut dyn FnMut(&StreamId, &T) -> bool) -> bool {
        self.inner.items(visit)
    }
}

/// Spawns the sweeper task. It ticks at `sweep_interval` and exits at the
/// next check after `shutdown` triggers, without a final sweep.
pub(crate) fn spawn_sweeper<T, M>(
    mut map: ExpiringMap<M>,
    sweep_interval: Duration,
    metrics: Arc<AggregatorMetrics>,
    shutdown: ShutdownSignal,
) -> JoinHandle<()>
where
    T: Send + 'static,
    M: Map<T> + Clone + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if shutdown.is_shutdown() {
                        break;
                    }
                    let evicted = map.sweep::<T>(Instant::now());
                    if evicted > 0 {
                        debug!(evicted, "dropped stale streams");
                        metrics.record_evicted(evicted as u64);
                    }
                }
                () = shutdown.notified() => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{identify, Attributes, MetricId};
    use crate::streams::{MemoryMap, SyncMap};

    fn id(name: &str) -> StreamId {
        identify(MetricId::new(name, "1"), &Attributes::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_stale_entries() {
        let mut map = ExpiringMap::new(MemoryMap::new(), Duration::from_secs(60));
        map.store(id("old"), 1u64);

        tokio::time::advance(Duration::from_secs(45)).await;
        map.store(id("fresh"), 2u64);
        tokio::time::advance(Duration::from_secs(30)).await;

        // "old" is 75s idle, "fresh" 30s
        let evicted = map.sweep::<u64>(Instant::now());
        assert_eq!(evicted, 1);
        assert_eq!(map.load(&id("old")), None);
        assert_eq!(map.load(&id("fresh")), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_touches_entry() {
        let mut map = ExpiringMap::new(MemoryMap::new(), Duration::from_secs(60));
        map.store(id("s"), 1u64);

        tokio::time::advance(Duration::from_secs(45)).await;
        map.store(id("s"), 2u64);
        tokio::time::advance(Duration::from_secs(45)).await;

        // refreshed 45s ago, still within max_stale
        assert_eq!(map.sweep::<u64>(Instant::now()), 0);
        assert_eq!(map.load(&id("s")), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_task_evicts_through_shared_map() {
        let mut map = ExpiringMap::new(
            SyncMap::new(MemoryMap::new()),
            Duration::from_secs(60),
        );
        map.store(id("s"), 1u64);

        let metrics = Arc::new(AggregatorMetrics::default());
        let shutdown = ShutdownSignal::new();
        let task = spawn_sweeper::<u64, _>(
            map.clone(),
            Duration::from_secs(10),
            Arc::clone(&metrics),
            shutdown.clone(),
        );

        tokio::time::advance(Duration::from_secs(120)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(map.len(), 0);
        assert_eq!(metrics.streams_evicted(), 1);

        shutdown.shutdown();
        task.await.unwrap();
    }
}
