//! Cancel-on-drop scheduled tasks.
//!
//! Reconnect backoff, PTT holdoff, and poll scheduling all follow the same
//! rule: at most one outstanding timer per purpose, and re-arming replaces
//! the previous one. [`ScheduledTask`] wraps a spawned tokio task with that
//! contract and aborts it when dropped, so nothing fires after an adapter
//! is torn down.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// A single restartable delayed action.
#[derive(Debug, Default)]
pub struct ScheduledTask {
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    /// Create an idle task slot.
    pub fn new() -> Self {
        ScheduledTask { handle: None }
    }

    /// Run `action` after `delay`, cancelling any previously scheduled action.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&mut self, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        }));
    }

    /// Cancel the pending action, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Whether an action is scheduled and has not yet finished.
    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let fired = Arc::new(AtomicU32::new(0));
        let mut task = ScheduledTask::new();
        let f = Arc::clone(&fired);
        task.schedule(Duration::from_millis(100), async move {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert!(task.is_pending());

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!task.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_previous_action() {
        let fired = Arc::new(AtomicU32::new(0));
        let mut task = ScheduledTask::new();
        for _ in 0..3 {
            let f = Arc::clone(&fired);
            task.schedule(Duration::from_millis(100), async move {
                f.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_and_drop_prevent_firing() {
        let fired = Arc::new(AtomicU32::new(0));

        let mut cancelled = ScheduledTask::new();
        let f = Arc::clone(&fired);
        cancelled.schedule(Duration::from_millis(10), async move {
            f.fetch_add(1, Ordering::SeqCst);
        });
        cancelled.cancel();
        assert!(!cancelled.is_pending());

        {
            let mut dropped = ScheduledTask::new();
            let f = Arc::clone(&fired);
            dropped.schedule(Duration::from_millis(10), async move {
                f.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
