//! Metric data points and their in-place accumulation semantics.
//!
//! Three point kinds flow through the aggregator: [`Number`], [`Histogram`]
//! and [`ExpHistogram`]. All implement the [`Point`] capability, so the
//! accumulator stays generic and needs no runtime type switches.
//!
//! `add` merges an incoming *delta* into the stored *cumulative*. Merges
//! never mask upstream bugs: a scale change, a bucket layout change or a
//! non-monotonic timestamp is reported as a [`MergeError`] instead of
//! producing a silently wrong cumulative.

pub mod expo;

use thiserror::Error;

pub use expo::Buckets;

/// Nanoseconds since the UNIX epoch.
pub type Timestamp = u64;

/// Merge failures. All of these indicate a defect upstream of the
/// aggregator, not bad luck at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    /// Int and double samples cannot be summed.
    #[error("cannot merge int and double number values")]
    NumberTypeMismatch,

    /// Explicit-bounds histograms must share their bucket layout.
    #[error("histogram bucket layout changed between samples")]
    BoundsMismatch,

    /// Exponential histograms must share their scale.
    #[error("histogram scale changed from {prev} to {sample}")]
    ScaleMismatch { prev: i32, sample: i32 },

    /// The accumulator state machine admits only strictly newer samples, so
    /// an out-of-order merge is a caller bug.
    #[error("merge of sample at time={sample} into state already at time={prev}")]
    OutOfOrderMerge { prev: Timestamp, sample: Timestamp },
}

/// Capability shared by all point kinds.
pub trait Point: Clone {
    /// Start of the series this point belongs to.
    fn start_timestamp(&self) -> Timestamp;

    /// Time of this observation.
    fn timestamp(&self) -> Timestamp;

    /// Writes this point into the caller's buffer, replacing its contents.
    fn copy_to(&self, dst: &mut Self) {
        dst.clone_from(self);
    }

    /// Accumulates `incoming` into `self` with the kind's merge semantics.
    fn add(&mut self, incoming: &Self) -> Result<(), MergeError>;
}

/// Combine two optional scalar fields; a field missing on either side is
/// removed from the result.
fn combine(field: &mut Option<f64>, incoming: Option<f64>, op: fn(f64, f64) -> f64) {
    *field = match (*field, incoming) {
        (Some(a), Some(b)) => Some(op(a, b)),
        _ => None,
    };
}

// =============================================================================
// NUMBER
// =============================================================================

/// An int or double sample value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumValue {
    Int(i64),
    Double(f64),
}

/// A counter sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Number {
    pub start: Timestamp,
    pub time: Timestamp,
    pub value: NumValue,
}

impl Number {
    pub fn int(start: Timestamp, time: Timestamp, value: i64) -> Self {
        Self {
            start,
            time,
            value: NumValue::Int(value),
        }
    }

    pub fn double(start: Timestamp, time: Timestamp, value: f64) -> Self {
        Self {
            start,
            time,
            value: NumValue::Double(value),
        }
    }
}

impl Point for Number {
    fn start_timestamp(&self) -> Timestamp {
        self.start
    }

    fn timestamp(&self) -> Timestamp {
        self.time
    }

    fn add(&mut self, incoming: &Self) -> Result<(), MergeError> {
        match (&mut self.value, incoming.value) {
            (NumValue::Int(a), NumValue::Int(b)) => *a += b,
            (NumValue::Double(a), NumValue::Double(b)) => *a += b,
            _ => return Err(MergeError::NumberTypeMismatch),
        }
        self.time = incoming.time;
        Ok(())
    }
}

// =============================================================================
// EXPLICIT-BOUNDS HISTOGRAM
// =============================================================================

/// A histogram with explicit bucket boundaries. `bucket_counts` has one more
/// entry than `bounds` (the overflow bucket).
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub start: Timestamp,
    pub time: Timestamp,
    pub count: u64,
    pub sum: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub bounds: Vec<f64>,
    pub bucket_counts: Vec<u64>,
}

impl Point for Histogram {
    fn start_timestamp(&self) -> Timestamp {
        self.start
    }

    fn timestamp(&self) -> Timestamp {
        self.time
    }

    fn add(&mut self, incoming: &Self) -> Result<(), MergeError> {
        if self.time >= incoming.time {
            return Err(MergeError::OutOfOrderMerge {
                prev: self.time,
                sample: incoming.time,
            });
        }
        if self.bounds != incoming.bounds
            || self.bucket_counts.len() != incoming.bucket_counts.len()
        {
            return Err(MergeError::BoundsMismatch);
        }

        for (bucket, add) in self.bucket_counts.iter_mut().zip(&incoming.bucket_counts) {
            *bucket += add;
        }
        self.count += incoming.count;
        combine(&mut self.sum, incoming.sum, |a, b| a + b);
        combine(&mut self.min, incoming.min, f64::min);
        combine(&mut self.max, incoming.max, f64::max);
        self.time = incoming.time;
        Ok(())
    }
}

// =============================================================================
// EXPONENTIAL HISTOGRAM
// =============================================================================

/// A base-2 exponential histogram. Bucket `k` covers
/// `(2^(k·2^-scale), 2^((k+1)·2^-scale)]`; values with magnitude at or below
/// `zero_threshold` land in the zero bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpHistogram {
    pub start: Timestamp,
    pub time: Timestamp,
    pub scale: i32,
    pub count: u64,
    pub zero_count: u64,
    pub zero_threshold: f64,
    pub sum: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub positive: Buckets,
    pub negative: Buckets,
}

impl Point for ExpHistogram {
    fn start_timestamp(&self) -> Timestamp {
        self.start
    }

    fn timestamp(&self) -> Timestamp {
        self.time
    }

    fn add(&mut self, incoming: &Self) -> Result<(), MergeError> {
        if self.time >= incoming.time {
            return Err(MergeError::OutOfOrderMerge {
                prev: self.time,
                sample: incoming.time,
            });
        }
        if self.scale != incoming.scale {
            return Err(MergeError::ScaleMismatch {
                prev: self.scale,
                sample: incoming.scale,
            });
        }

        // Reconcile zero thresholds by widening the lower one to the higher.
        let widened;
        let incoming = if incoming.zero_threshold < self.zero_threshold {
            widened = {
                let mut low = incoming.clone();
                low.widen_zero(self.zero_threshold);
                low
            };
            &widened
        } else {
            if incoming.zero_threshold > self.zero_threshold {
                self.widen_zero(incoming.zero_threshold);
            }
            incoming
        };

        expo::merge(&mut self.positive, &incoming.positive);
        expo::merge(&mut self.negative, &incoming.negative);

        self.count += incoming.count;
        self.zero_count += incoming.zero_count;
        combine(&mut self.sum, incoming.sum, |a, b| a + b);
        combine(&mut self.min, incoming.min, f64::min);
        combine(&mut self.max, incoming.max, f64::max);
        self.time = incoming.time;
        Ok(())
    }
}
