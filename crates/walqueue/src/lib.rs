//! Durable Write-Ahead Queue
//!
//! A crash-safe, disk-backed FIFO that decouples synchronous producers
//! (accepting remote-write payloads) from an asynchronous forwarder shipping
//! items to a downstream receiver. Items survive process and host crashes
//! until explicitly acknowledged by the sink.
//!
//! # Architecture
//!
//! - [`Log`]: append-only, index-addressable segment store with
//!   front-truncation. Every write is fsynced before it is reported durable.
//! - [`Sink`] / [`BufSink`]: the consumer-side contract and its in-memory
//!   batching decorator. Sinks acknowledge delivered items via
//!   [`SinkItem::ack`].
//! - [`Queue`]: the coordinator owning the log, a single forwarder task and
//!   a single flush-and-truncate task.
//!
//! # Example
//!
//! ```ignore
//! use walqueue::{Queue, QueueConfig, NullSink};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = QueueConfig::new("/var/lib/collector/wal");
//!     let queue = Queue::open(config, NullSink::new()).await.unwrap();
//!
//!     queue.add(&b"encoded remote-write request".to_vec()).await.unwrap();
//!
//!     // the forwarder delivers in the background; close() flushes,
//!     // truncates the acknowledged prefix and releases the directory
//!     queue.close().await.unwrap();
//! }
//! ```

mod ack;
mod config;
mod entry;
mod error;
mod invariants;
mod log;
mod metrics;
mod queue;
mod shutdown;
mod sink;

pub use config::{QueueConfig, RetryPolicy};
pub use entry::Entry;
pub use error::{
    CodecError, DefaultPolicy, FailurePolicy, LogError, QueueError, Severity, SinkError,
    StrictPolicy,
};
pub use log::{Idx, Log};
pub use metrics::QueueMetrics;
pub use queue::Queue;
pub use shutdown::ShutdownSignal;
pub use sink::{BufSink, NullSink, Sink, SinkItem};
