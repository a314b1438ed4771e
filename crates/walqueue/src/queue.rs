//! The queue coordinator: durable producer path, background forwarder and
//! periodic flush-and-truncate.
//!
//! # Positions
//!
//! Three indices drive the queue:
//!
//! - `write_idx`: next index a [`Queue::add`] will take. Published after
//!   the log write is durable.
//! - `read_idx`: next index the forwarder reads. Advanced only after the
//!   sink accepted the item (or a damaged record was skipped), so an
//!   unacknowledged item is retried rather than passed over.
//! - the ack watermark: the contiguously-acknowledged prefix, maintained
//!   by [`crate::ack::AckSet`].
//!
//! `base ≤ watermark ≤ read_idx ≤ write_idx` at every quiescent point.
//!
//! # Crash safety
//!
//! `add` returns only after the entry is fsynced. Truncation never drops an
//! index that has not been acknowledged by the sink. Together this gives
//! at-least-once delivery: a crash between the fsync and the ack leaves the
//! entry in the log, and the next start redelivers the whole unacked suffix
//! in index order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::ack::AckSet;
use crate::config::QueueConfig;
use crate::entry::Entry;
use crate::error::{DefaultPolicy, FailurePolicy, QueueError, Severity};
use crate::invariants::{debug_assert_horizon_within_read, debug_assert_read_within_write};
use crate::log::{Idx, Log};
use crate::metrics::QueueMetrics;
use crate::shutdown::ShutdownSignal;
use crate::sink::{BufSink, Sink, SinkItem};

/// A crash-safe disk-backed FIFO connecting synchronous producers with an
/// asynchronous forwarding sink.
///
/// Multiple producers may call [`Queue::add`] concurrently (share the queue
/// behind an `Arc`). Exactly one forwarder task reads the log and feeds the
/// sink; exactly one truncator task periodically flushes the sink and drops
/// the acknowledged prefix from disk.
pub struct Queue<T: Entry, S: Sink<T>, P: FailurePolicy = DefaultPolicy> {
    shared: Arc<Shared<T, S, P>>,
    shutdown: ShutdownSignal,
    forwarder: Option<JoinHandle<()>>,
    truncator: Option<JoinHandle<()>>,
}

struct Shared<T, S, P> {
    log: tokio::sync::Mutex<Log>,
    sink: BufSink<T, S>,
    acks: Arc<AckSet>,
    /// Next index to assign to an incoming add.
    write_idx: CachePadded<AtomicU64>,
    /// Next index the forwarder will read. Written only by the forwarder.
    read_idx: CachePadded<AtomicU64>,
    metrics: Arc<QueueMetrics>,
    policy: P,
    config: QueueConfig,
}

impl<T, S> Queue<T, S>
where
    T: Entry + 'static,
    S: Sink<T> + 'static,
{
    /// Opens the queue with the default failure classification.
    pub async fn open(config: QueueConfig, sink: S) -> Result<Self, QueueError> {
        Self::with_policy(config, sink, DefaultPolicy).await
    }
}

impl<T, S, P> Queue<T, S, P>
where
    T: Entry + 'static,
    S: Sink<T> + 'static,
    P: FailurePolicy + 'static,
{
    /// Opens the queue, recovering any entries a previous instance left in
    /// `config.dir`, and starts the background tasks. Recovered entries are
    /// redelivered to the sink in index order.
    pub async fn with_policy(config: QueueConfig, sink: S, policy: P) -> Result<Self, QueueError> {
        let log = Log::open(&config.dir, config.segment_entries).await?;
        let base = log.base();
        let head = log.head();

        let metrics = Arc::new(QueueMetrics::default());
        let acks = Arc::new(AckSet::new(base, Arc::clone(&metrics)));
        let shared = Arc::new(Shared {
            log: tokio::sync::Mutex::new(log),
            sink: BufSink::new(sink, config.buf_count),
            acks,
            write_idx: CachePadded::new(AtomicU64::new(head)),
            read_idx: CachePadded::new(AtomicU64::new(base)),
            metrics,
            policy,
            config,
        });
        let shutdown = ShutdownSignal::new();

        let forwarder = tokio::spawn(run_forwarder(Arc::clone(&shared), shutdown.clone()));
        let truncator = tokio::spawn(run_truncator(Arc::clone(&shared), shutdown.clone()));

        Ok(Self {
            shared,
            shutdown,
            forwarder: Some(forwarder),
            truncator: Some(truncator),
        })
    }

    /// Appends an item. Returns its index once the entry is durable on
    /// disk; a crash after this point cannot lose the item.
    pub async fn add(&self, item: &T) -> Result<Idx, QueueError> {
        let payload = item.encode()?;
        let mut log = self.shared.log.lock().await;
        let idx = log.head();
        log.write(idx, &payload).await?;
        self.shared.write_idx.store(idx + 1, Ordering::Release);
        drop(log);
        self.shared.metrics.record_enqueued();
        Ok(idx)
    }

    /// Number of entries written but not yet handed to the sink.
    pub fn size(&self) -> u64 {
        let read = self.shared.read_idx.load(Ordering::Acquire);
        let write = self.shared.write_idx.load(Ordering::Acquire);
        debug_assert_read_within_write!(read, write);
        write.saturating_sub(read)
    }

    /// Activity counters.
    pub fn metrics(&self) -> &Arc<QueueMetrics> {
        &self.shared.metrics
    }

    /// A signal that stops the background loops when triggered.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Stops both background tasks, flushes the sink, truncates up to the
    /// acknowledged horizon and closes the log. Entries between the horizon
    /// and `write_idx` stay on disk for the next start.
    pub async fn close(mut self) -> Result<(), QueueError> {
        self.shutdown.shutdown();
        if let Some(task) = self.forwarder.take() {
            let _ = task.await;
        }
        if let Some(task) = self.truncator.take() {
            let _ = task.await;
        }

        self.shared.sink.flush().await?;

        let read = self.shared.read_idx.load(Ordering::Acquire);
        let horizon = self.shared.acks.horizon().min(read);
        let mut log = self.shared.log.lock().await;
        log.truncate_front(horizon).await?;
        log.close().await?;
        Ok(())
    }
}

/// Forwarder loop: tail the log and hand every entry to the sink, in index
/// order. Single instance per queue.
async fn run_forwarder<T, S, P>(shared: Arc<Shared<T, S, P>>, shutdown: ShutdownSignal)
where
    T: Entry,
    S: Sink<T>,
    P: FailurePolicy,
{
    let mut attempt: u32 = 0;
    loop {
        if shutdown.is_shutdown() {
            break;
        }

        let read = shared.read_idx.load(Ordering::Acquire);
        let write = shared.write_idx.load(Ordering::Acquire);
        debug_assert_read_within_write!(read, write);
        if read >= write {
            shutdown.sleep(shared.config.poll_interval).await;
            continue;
        }

        let decoded = {
            let log = shared.log.lock().await;
            log.read(read).await
        }
        .map_err(QueueError::Log)
        .and_then(|bytes| T::decode(&bytes).map_err(QueueError::Codec));

        let item = match decoded {
            Ok(item) => item,
            Err(err) => match shared.policy.on_read(&err) {
                Severity::Recoverable => {
                    warn!(idx = read, error = %err, "skipping unreadable record");
                    shared.metrics.record_read_error();
                    // A skipped record can never be acknowledged by a sink;
                    // ack it here so the truncation watermark can pass it.
                    shared.acks.ack(read);
                    shared.read_idx.store(read + 1, Ordering::Release);
                    attempt = 0;
                    continue;
                }
                Severity::Fatal => {
                    error!(idx = read, error = %err, "read failure, stopping forwarder");
                    break;
                }
            },
        };

        let handle = SinkItem::new(item, read, Arc::clone(&shared.acks));
        match shared.sink.handle(handle).await {
            Ok(()) => {
                shared.read_idx.store(read + 1, Ordering::Release);
                shared.metrics.record_forwarded();
                attempt = 0;
            }
            Err(err) => {
                shared.metrics.record_sink_error();
                match shared.policy.on_sink(&err) {
                    Severity::Recoverable => {
                        attempt += 1;
                        warn!(idx = read, attempt, error = %err, "sink failed, retrying");
                        // read_idx stays put: the same entry is re-read and
                        // retried after a capped exponential delay.
                        shutdown.sleep(shared.config.retry.delay_for_attempt(attempt)).await;
                    }
                    Severity::Fatal => {
                        error!(idx = read, error = %err, "sink failure, stopping forwarder");
                        break;
                    }
                }
            }
        }
    }
}

/// Truncator loop: periodically flush the sink and drop the acknowledged
/// prefix from disk. Single instance per queue.
async fn run_truncator<T, S, P>(shared: Arc<Shared<T, S, P>>, shutdown: ShutdownSignal)
where
    T: Entry,
    S: Sink<T>,
    P: FailurePolicy,
{
    let mut ticker = tokio::time::interval(shared.config.trunc_freq);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if shutdown.is_shutdown() {
                    break;
                }
                if let Err(err) = flush_and_truncate(&shared).await {
                    error!(error = %err, "truncation failure, stopping truncator");
                    break;
                }
            }
            () = shutdown.notified() => break,
        }
    }
}

async fn flush_and_truncate<T, S, P>(shared: &Shared<T, S, P>) -> Result<(), QueueError>
where
    T: Entry,
    S: Sink<T>,
    P: FailurePolicy,
{
    if let Err(err) = shared.sink.flush().await {
        match shared.policy.on_sink(&err) {
            Severity::Recoverable => {
                warn!(error = %err, "sink flush failed, keeping log entries");
                return Ok(());
            }
            Severity::Fatal => return Err(QueueError::Sink(err)),
        }
    }

    let read = shared.read_idx.load(Ordering::Acquire);
    let horizon = shared.acks.horizon().min(read);
    debug_assert_horizon_within_read!(horizon, read);

    let mut log = shared.log.lock().await;
    let old_base = log.base();
    match log.truncate_front(horizon).await {
        Ok(()) => {
            let dropped = horizon.saturating_sub(old_base);
            if dropped > 0 {
                debug!(upto = horizon, dropped, "truncated acknowledged prefix");
            }
            shared.metrics.record_truncation(dropped);
            Ok(())
        }
        Err(err) => match shared.policy.on_truncate(&err) {
            Severity::Recoverable => {
                warn!(error = %err, "truncation failed");
                Ok(())
            }
            Severity::Fatal => Err(QueueError::Log(err)),
        },
    }
}
