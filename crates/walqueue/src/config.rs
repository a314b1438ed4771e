//! Configuration for queue behavior.

use std::path::PathBuf;
use std::time::Duration;

/// Retry pacing for sink failures.
///
/// The forwarder never gives up on an item; the delay between attempts grows
/// exponentially and is capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries (caps exponential growth).
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 = double delay each retry).
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Calculate the delay for a given attempt number (0 = initial attempt).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let delay_ms =
            self.initial_delay.as_millis() as f64 * self.multiplier.powi((attempt - 1) as i32);
        let delay = Duration::from_millis(delay_ms as u64);
        delay.min(self.max_delay)
    }
}

/// Configuration for a [`crate::Queue`].
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Directory holding the log. Owned exclusively by one queue instance.
    pub dir: PathBuf,

    /// Maximum items buffered in memory before the sink is drained.
    ///
    /// `0` disables buffering; every item is forwarded immediately.
    ///
    /// Default: 64
    pub buf_count: usize,

    /// Interval between periodic flush-and-truncate passes.
    ///
    /// Smaller values bound steady-state disk use tighter at the cost of
    /// more flush and truncate IO.
    ///
    /// Default: 30s
    pub trunc_freq: Duration,

    /// How long the forwarder sleeps when the queue is empty.
    ///
    /// Default: 1s
    pub poll_interval: Duration,

    /// Records per log segment file before rotation.
    ///
    /// Default: 1024
    pub segment_entries: usize,

    /// Retry pacing for sink failures.
    pub retry: RetryPolicy,
}

impl QueueConfig {
    /// Creates a configuration for the given log directory with defaults
    /// for everything else.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            buf_count: 64,
            trunc_freq: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            segment_entries: 1024,
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the in-memory buffer capacity.
    pub fn with_buf_count(mut self, count: usize) -> Self {
        self.buf_count = count;
        self
    }

    /// Sets the flush-and-truncate interval.
    pub fn with_trunc_freq(mut self, freq: Duration) -> Self {
        self.trunc_freq = freq;
        self
    }

    /// Sets the empty-queue poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the number of records per segment file.
    pub fn with_segment_entries(mut self, entries: usize) -> Self {
        self.segment_entries = entries.max(1);
        self
    }

    /// Sets the sink retry pacing.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
