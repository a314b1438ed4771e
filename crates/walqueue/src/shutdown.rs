//! Cooperative shutdown for the queue's background loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

/// Shared shutdown state between the queue handle and its background tasks.
#[derive(Debug)]
struct ShutdownState {
    /// Flag indicating shutdown has been initiated.
    initiated: AtomicBool,
    /// Wakes loops that are sleeping between work.
    notify: Notify,
}

/// A cloneable signal for triggering shutdown.
///
/// Cancellation is cooperative: loops observe the flag between blocking
/// operations; no in-flight operation is interrupted. Calling
/// [`ShutdownSignal::shutdown`] is idempotent.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    state: Arc<ShutdownState>,
}

impl ShutdownSignal {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(ShutdownState {
                initiated: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Initiates shutdown and wakes every sleeping loop.
    pub fn shutdown(&self) {
        if !self.state.initiated.swap(true, Ordering::AcqRel) {
            self.state.notify.notify_waiters();
        }
    }

    /// Returns `true` if shutdown has been initiated.
    pub fn is_shutdown(&self) -> bool {
        self.state.initiated.load(Ordering::Acquire)
    }

    /// Completes when shutdown is triggered.
    pub(crate) async fn notified(&self) {
        if self.is_shutdown() {
            return;
        }
        self.state.notify.notified().await;
    }

    /// Sleeps for `dur`, returning early when shutdown is triggered.
    pub(crate) async fn sleep(&self, dur: Duration) {
        if dur.is_zero() || self.is_shutdown() {
            return;
        }
        tokio::select! {
            () = tokio::time::sleep(dur) => {}
            () = self.notified() => {}
        }
    }
}
