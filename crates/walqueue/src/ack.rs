//! Acknowledgement tracking between the sink and the truncator.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use crate::invariants::debug_assert_watermark_monotonic;
use crate::log::Idx;
use crate::metrics::QueueMetrics;

/// The contiguously-acknowledged prefix of the log.
///
/// Sinks acknowledge indices in whatever order their delivery completes (a
/// buffered sink acks a whole batch at once). Truncation must only ever drop
/// a gapless prefix, so out-of-order acknowledgements are parked until the
/// gap closes. Duplicate acks are ignored.
#[derive(Debug)]
pub(crate) struct AckSet {
    state: Mutex<AckState>,
    metrics: Arc<QueueMetrics>,
}

#[derive(Debug)]
struct AckState {
    /// First index that has not been acknowledged.
    next: Idx,
    /// Acknowledged indices above `next`, waiting for the gap to close.
    pending: BTreeSet<Idx>,
}

impl AckSet {
    pub(crate) fn new(start: Idx, metrics: Arc<QueueMetrics>) -> Self {
        Self {
            state: Mutex::new(AckState {
                next: start,
                pending: BTreeSet::new(),
            }),
            metrics,
        }
    }

    /// Records an acknowledgement for `idx`.
    pub(crate) fn ack(&self, idx: Idx) {
        let mut state = self.state.lock().unwrap();
        if idx < state.next || state.pending.contains(&idx) {
            // duplicate
            return;
        }
        if idx == state.next {
            let before = state.next;
            state.next += 1;
            while state.pending.first().copied() == Some(state.next) {
                state.pending.pop_first();
                state.next += 1;
            }
            debug_assert_watermark_monotonic!(before, state.next);
        } else {
            state.pending.insert(idx);
        }
        self.metrics.record_acked();
    }

    /// Returns the first unacknowledged index. Everything below it is safe
    /// to drop from the log.
    pub(crate) fn horizon(&self) -> Idx {
        self.state.lock().unwrap().next
    }
}
