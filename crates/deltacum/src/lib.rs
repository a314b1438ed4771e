//! Delta-to-Cumulative Aggregation
//!
//! Converts delta-temporality metric samples (counters, histograms,
//! exponential histograms) into cumulative-temporality samples, enforcing
//! strict temporal ordering per stream and evicting streams that go stale.
//!
//! # Architecture
//!
//! - [`identity`]: hashes (metric, attribute set) into a stable
//!   [`StreamId`].
//! - [`data`]: the three point kinds behind the [`Point`] capability,
//!   including exponential-histogram bucket merging and zero-bucket
//!   widening.
//! - [`streams`] / [`expiry`]: the layered stream map (plain, synchronized,
//!   expiring).
//! - [`delta`]: the per-stream accumulator state machine.
//! - [`DeltaToCumulative`]: everything assembled behind one shared handle.
//!
//! # Example
//!
//! ```ignore
//! use deltacum::{identify, Attributes, MetricId, Number, Options};
//!
//! #[tokio::main]
//! async fn main() {
//!     let aggr = deltacum::numbers(Options::default());
//!     let id = identify(MetricId::new("http_requests_total", "1"), &Attributes::new());
//!
//!     let c1 = aggr.aggregate(id, &Number::int(100, 110, 3)).unwrap();
//!     let c2 = aggr.aggregate(id, &Number::int(100, 120, 4)).unwrap();
//!     // c1 = 3, c2 = 7: deltas became running totals
//!
//!     aggr.shutdown().await;
//! }
//! ```

pub mod data;
pub mod delta;
pub mod expiry;
pub mod identity;
pub mod streams;

mod config;
mod metrics;
mod pipeline;
mod shutdown;

pub use config::Options;
pub use data::{
    Buckets, ExpHistogram, Histogram, MergeError, NumValue, Number, Point, Timestamp,
};
pub use delta::{Accumulator, AggregateError, Aggregator, SyncAggregator};
pub use identity::{identify, AttrValue, Attributes, MetricId, StreamId};
pub use metrics::AggregatorMetrics;
pub use pipeline::{exp_histograms, histograms, numbers, DeltaToCumulative};
pub use shutdown::ShutdownSignal;
pub use streams::{update, Map, MemoryMap, SyncMap, UpdateErrors};
