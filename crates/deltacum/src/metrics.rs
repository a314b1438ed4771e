//! Thread-safe counters for aggregator activity.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by aggregation and by the expiry sweeper. The number of
/// tracked streams is observable from the stream map itself.
#[derive(Debug, Default)]
pub struct AggregatorMetrics {
    samples_processed: AtomicU64,
    samples_dropped: AtomicU64,
    streams_evicted: AtomicU64,
}

impl AggregatorMetrics {
    /// Samples fed into the accumulator.
    pub fn samples_processed(&self) -> u64 {
        self.samples_processed.load(Ordering::Relaxed)
    }

    /// Samples dropped with a per-stream error.
    pub fn samples_dropped(&self) -> u64 {
        self.samples_dropped.load(Ordering::Relaxed)
    }

    /// Streams removed for inactivity.
    pub fn streams_evicted(&self) -> u64 {
        self.streams_evicted.load(Ordering::Relaxed)
    }

    pub(crate) fn record_processed(&self) {
        self.samples_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.samples_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evicted(&self, count: u64) {
        self.streams_evicted.fetch_add(count, Ordering::Relaxed);
    }
}
