//! Cooperative shutdown for the expiry sweeper.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// A cloneable signal that stops the background sweeper.
///
/// Triggering is idempotent; the sweeper exits at its next check without a
/// final sweep.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    state: Arc<State>,
}

#[derive(Debug, Default)]
struct State {
    initiated: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Initiates shutdown and wakes the sweeper.
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
}
