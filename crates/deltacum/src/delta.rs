//! The delta-to-cumulative state machine.

use std::marker::PhantomData;
use std::sync::Mutex;

use thiserror::Error;

use crate::data::{MergeError, Point, Timestamp};
use crate::identity::StreamId;
use crate::streams::Map;

/// Failures surfaced per sample. `OlderStart` and `OutOfOrder` carry both
/// offending timestamps for diagnostics; in all cases the sample is dropped
/// and the stored cumulative is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    /// The sample belongs to a series that has already been superseded.
    #[error("dropped sample with start_time={sample}, because series only starts at start_time={start}; consider checking for multiple processes sending the exact same series")]
    OlderStart { start: Timestamp, sample: Timestamp },

    /// The sample is not strictly newer than the stored cumulative.
    #[error("out of order: dropped sample from time={sample}, because series is already at time={last}")]
    OutOfOrder { last: Timestamp, sample: Timestamp },

    /// The merge itself failed (scale change, layout change). An upstream
    /// bug; surfaced rather than masked.
    #[error(transparent)]
    Merge(#[from] MergeError),
}

/// Converts delta samples into cumulative points, per stream.
pub trait Aggregator<D: Point> {
    /// Feeds one sample. On success returns the updated cumulative for the
    /// stream, which the caller writes back into the pipeline buffer.
    fn aggregate(&mut self, id: StreamId, dp: &D) -> Result<D, AggregateError>;
}

/// The per-stream accumulator.
///
/// For every sample the state machine is:
///
/// | stored state vs. sample          | action                    |
/// |----------------------------------|---------------------------|
/// | stream unknown                   | keep sample as cumulative |
/// | sample start older               | drop (`OlderStart`)       |
/// | sample start newer               | reset to sample           |
/// | sample time not after cumulative | drop (`OutOfOrder`)       |
/// | otherwise                        | merge into cumulative     |
pub struct Accumulator<D, M> {
    map: M,
    _point: PhantomData<fn() -> D>,
}

impl<D: Point, M: Map<D>> Accumulator<D, M> {
    pub fn new(map: M) -> Self {
        Self {
            map,
            _point: PhantomData,
        }
    }

    /// Number of streams currently tracked.
    pub fn tracked(&self) -> usize {
        self.map.len()
    }

    /// Stores the sample as the new cumulative for this stream.
    fn reset(&mut self, id: StreamId, dp: &D) -> D {
        let clone = dp.clone();
        self.map.store(id, clone.clone());
        clone
    }
}

impl<D: Point, M: Map<D>> Aggregator<D> for Accumulator<D, M> {
    fn aggregate(&mut self, id: StreamId, dp: &D) -> Result<D, AggregateError> {
        let Some(prev) = self.map.load(&id) else {
            // new stream
            return Ok(self.reset(id, dp));
        };

        // belongs to an older series: drop
        if dp.start_timestamp() < prev.start_timestamp() {
            return Err(AggregateError::OlderStart {
                start: prev.start_timestamp(),
                sample: dp.start_timestamp(),
            });
        }
        // belongs to a later series: reset
        if dp.start_timestamp() > prev.start_timestamp() {
            return Ok(self.reset(id, dp));
        }
        // out of order: drop
        if dp.timestamp() <= prev.timestamp() {
            return Err(AggregateError::OutOfOrder {
                last: prev.timestamp(),
                sample: dp.timestamp(),
            });
        }

        let mut next = prev;
        next.add(dp)?;
        self.map.store(id, next.clone());
        Ok(next)
    }
}

/// Serializes an aggregator behind a mutex so it can be shared.
///
/// Aggregation is CPU-bound and short; one exclusive lock per sample is
/// adequate, no per-stream locking is needed.
pub struct SyncAggregator<A> {
    inner: Mutex<A>,
}

impl<A> SyncAggregator<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Feeds one sample through the shared aggregator.
    pub fn aggregate<D: Point>(&self, id: StreamId, dp: &D) -> Result<D, AggregateError>
    where
        A: Aggregator<D>,
    {
        self.inner.lock().unwrap().aggregate(id, dp)
    }
}

impl<D: Point, A: Aggregator<D>> Aggregator<D> for SyncAggregator<A> {
    fn aggregate(&mut self, id: StreamId, dp: &D) -> Result<D, AggregateError> {
        self.inner.lock().unwrap().aggregate(id, dp)
    }
}
