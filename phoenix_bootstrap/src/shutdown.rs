//! Shutdown coordination.
//!
//! A single `ShutdownHandle` is cloned into every long-running task (the
//! governor tick loop, the safety-monitor poll loop). `trigger` is called
//! once, from the signal wait future or a test; every clone's `notified`
//! future resolves at that point so each loop can drain at its own next
//! suspension point instead of being aborted mid-tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// True once `trigger` has run; loops should check this after waking.
    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Marks shutdown and wakes every task awaiting `wait`.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Resolves once `trigger` has been called, immediately if it already
    /// has been.
    pub async fn wait(&self) {
        if self.is_shutdown() {
            return;
        }
        self.notify.notified().await;
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_resolves_after_trigger() {
        let handle = ShutdownHandle::new();
        let waiter = handle.clone();

        let task = tokio::spawn(async move {
            waiter.wait().await;
            waiter.is_shutdown()
        });

        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
        handle.trigger();

        assert!(task.await.expect("task panicked"));
    }

    #[tokio::test]
    async fn wait_returns_immediately_if_already_triggered() {
        let handle = ShutdownHandle::new();
        handle.trigger();
        handle.wait().await;
        assert!(handle.is_shutdown());
    }
}
