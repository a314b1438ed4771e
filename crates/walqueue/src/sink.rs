//! Sink contract and the buffering decorator.
//!
//! A [`Sink`] receives the items the forwarder reads from the log and ships
//! them to the outside world. The terminal sink acknowledges an item by
//! calling [`SinkItem::ack`] once it has been durably delivered downstream;
//! an item dropped without acking stays in the log and is redelivered after
//! the next start (at-least-once).
//!
//! [`BufSink`] batches items in memory before forwarding, trading ack
//! latency for fewer downstream calls.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::ack::AckSet;
use crate::entry::Entry;
use crate::error::SinkError;
use crate::log::Idx;

/// A log entry in flight between the forwarder and the downstream receiver.
///
/// Bundles the decoded payload, its log index and the ack capability.
#[derive(Debug)]
pub struct SinkItem<T> {
    data: T,
    idx: Idx,
    acks: Arc<AckSet>,
}

impl<T> SinkItem<T> {
    pub(crate) fn new(data: T, idx: Idx, acks: Arc<AckSet>) -> Self {
        Self { data, idx, acks }
    }

    /// The payload.
    pub fn data(&self) -> &T {
        &self.data
    }

    /// The log index this item was read from.
    pub fn idx(&self) -> Idx {
        self.idx
    }

    /// Declares the item durably delivered. The entry becomes eligible for
    /// truncation once every index below it is acknowledged too.
    pub fn ack(self) {
        self.acks.ack(self.idx);
    }
}

/// Forwards queue items to the external world.
///
/// Uses native async fn in traits; for the queue the sink type is a generic
/// parameter, so no object safety is required.
///
/// The provided [`Sink::flush`] is a no-op; sinks that hold items in memory
/// override it to drain synchronously. The queue calls `flush` on every
/// truncation pass and on shutdown.
pub trait Sink<T: Entry>: Send + Sync {
    /// Takes ownership of the item. Implementations must [`SinkItem::ack`]
    /// exactly the items they have durably delivered and no others.
    fn handle(&self, item: SinkItem<T>) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Forces buffered items out. Sinks without internal state keep the
    /// default.
    fn flush(&self) -> impl Future<Output = Result<(), SinkError>> + Send {
        async { Ok(()) }
    }

    /// Returns the sink name for diagnostics.
    fn name(&self) -> &str;
}

/// A sink decorator that collects up to `capacity` items before forwarding
/// them to the inner sink.
///
/// Buffered items are forwarded in FIFO order, on overflow and on
/// [`Sink::flush`]. Draining stops at the first inner error; the failed item
/// is not re-buffered, but its log entry remains unacknowledged and survives
/// for redelivery after a restart. `flush` also flushes the inner sink, so
/// stacked buffers drain recursively.
pub struct BufSink<T, S> {
    inner: S,
    buf: Mutex<VecDeque<SinkItem<T>>>,
    capacity: usize,
}

impl<T: Entry, S: Sink<T>> BufSink<T, S> {
    /// Wraps `inner` with a buffer of `capacity` items. A capacity of zero
    /// forwards every item immediately.
    pub fn new(inner: S, capacity: usize) -> Self {
        Self {
            inner,
            buf: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// The wrapped sink.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn drain(inner: &S, buf: &mut VecDeque<SinkItem<T>>) -> Result<(), SinkError> {
        while let Some(item) = buf.pop_front() {
            inner.handle(item).await?;
        }
        Ok(())
    }
}

impl<T: Entry, S: Sink<T>> Sink<T> for BufSink<T, S> {
    async fn handle(&self, item: SinkItem<T>) -> Result<(), SinkError> {
        if self.capacity == 0 {
            return self.inner.handle(item).await;
        }
        let mut buf = self.buf.lock().await;
        if buf.len() >= self.capacity {
            Self::drain(&self.inner, &mut buf).await?;
        }
        buf.push_back(item);
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        let mut buf = self.buf.lock().await;
        Self::drain(&self.inner, &mut buf).await?;
        self.inner.flush().await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Discards and acknowledges every item. Useful for benchmarks and for
/// draining a queue that is no longer wanted.
#[derive(Debug, Default)]
pub struct NullSink;

impl NullSink {
    pub fn new() -> Self {
        Self
    }
}

impl<T: Entry> Sink<T> for NullSink {
    async fn handle(&self, item: SinkItem<T>) -> Result<(), SinkError> {
        item.ack();
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}
