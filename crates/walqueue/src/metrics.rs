//! Thread-safe counters for queue activity.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the producer path, the forwarder and the truncator.
///
/// All fields are atomics so the struct can be shared across tasks without
/// locking; reads use relaxed ordering since the values are advisory.
#[derive(Debug, Default)]
pub struct QueueMetrics {
    enqueued: AtomicU64,
    forwarded: AtomicU64,
    acked: AtomicU64,
    read_errors: AtomicU64,
    sink_errors: AtomicU64,
    truncations: AtomicU64,
    entries_truncated: AtomicU64,
}

impl QueueMetrics {
    /// Items written durably to the log.
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Items handed to the sink.
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Items acknowledged by the sink.
    pub fn acked(&self) -> u64 {
        self.acked.load(Ordering::Relaxed)
    }

    /// Records skipped because they could not be read or decoded.
    pub fn read_errors(&self) -> u64 {
        self.read_errors.load(Ordering::Relaxed)
    }

    /// Failed sink deliveries (each retry counts).
    pub fn sink_errors(&self) -> u64 {
        self.sink_errors.load(Ordering::Relaxed)
    }

    /// Completed truncation passes.
    pub fn truncations(&self) -> u64 {
        self.truncations.load(Ordering::Relaxed)
    }

    /// Log entries dropped by truncation.
    pub fn entries_truncated(&self) -> u64 {
        self.entries_truncated.load(Ordering::Relaxed)
    }

    pub(crate) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_acked(&self) {
        self.acked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sink_error(&self) {
        self.sink_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_truncation(&self, entries: u64) {
        self.truncations.fetch_add(1, Ordering::Relaxed);
        self.entries_truncated.fetch_add(entries, Ordering::Relaxed);
    }
}
