//! Configuration for the aggregation pipeline.

use std::time::Duration;

/// Options for [`crate::DeltaToCumulative`].
#[derive(Debug, Clone)]
pub struct Options {
    /// Duration after which an inactive stream is dropped. Bounds memory;
    /// a sample arriving for an evicted stream starts a new series.
    ///
    /// `Duration::ZERO` disables expiry entirely.
    ///
    /// Default: 5 minutes
    pub max_stale: Duration,

    /// How often the sweeper scans for stale streams.
    ///
    /// Default: 30s
    pub sweep_interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_stale: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

impl Options {
    /// Sets the stale-stream cutoff.
    pub fn with_max_stale(mut self, max_stale: Duration) -> Self {
        self.max_stale = max_stale;
        self
    }

    /// Sets the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}
