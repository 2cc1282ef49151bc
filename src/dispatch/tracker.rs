//! Completion tracker: counts workers that have not yet exited.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Shared counter of live workers.
///
/// Workers register before they are spawned and hold the returned
/// [`WorkerGuard`] for their whole lifetime. The count drops when the guard
/// drops, so a panicking worker is still counted out.
#[derive(Debug, Default)]
pub struct CompletionTracker {
    active: AtomicUsize,
    idle: Notify,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one worker. Must be called before the worker is launched.
    pub fn register(self: &Arc<Self>) -> WorkerGuard {
        self.active.fetch_add(1, Ordering::AcqRel);
        WorkerGuard {
            tracker: Arc::clone(self),
        }
    }

    /// Number of workers still running.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Wait until every registered worker has exited.
    ///
    /// Cancel safe: dropping the future loses nothing, the count is
    /// re-checked on every call.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn finish(&self) {
        if self.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Decrements the tracker on drop.
#[derive(Debug)]
pub struct WorkerGuard {
    tracker: Arc<CompletionTracker>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.tracker.finish();
    }
}
