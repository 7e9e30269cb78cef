//! # Resilience Module
//!
//! Failure-handling discipline for every external call the pipeline makes:
//! the retry executor with exponential backoff and jitter, and the
//! cancellation primitive that lets operator cancels interrupt in-flight
//! retry loops at safe checkpoints. Circuit-breaking decisions come from
//! the health monitor's snapshot, consulted before every attempt.

pub mod backoff;
pub mod retry;

pub use backoff::RetryPolicy;
pub use retry::{AttemptOutcome, RetryExecutor, StageAttempt};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

/// Cooperative cancellation flag for one content item (or the whole system).
///
/// Cancellation is observed at backoff checkpoints and between stages,
/// never mid-external-call, to avoid inconsistent partial side effects.
#[derive(Clone, Debug)]
pub struct CancellationFlag {
    inner: Arc<CancellationInner>,
}

#[derive(Debug)]
struct CancellationInner {
    item_id: Uuid,
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationFlag {
    /// Flag not tied to a specific item (system shutdown)
    pub fn new() -> Self {
        Self::for_item(Uuid::nil())
    }

    /// Flag for one content item
    pub fn for_item(item_id: Uuid) -> Self {
        Self {
            inner: Arc::new(CancellationInner {
                item_id,
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    pub fn item_id(&self) -> Uuid {
        self.inner.item_id
    }

    /// Request cancellation; wakes every waiter
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Resolve once cancellation is requested
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancellationFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let flag = CancellationFlag::new();
        let waiter = flag.clone();

        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
            true
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        flag.cancel();

        let woke = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(woke);
        assert!(flag.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_immediately_when_already_set() {
        let flag = CancellationFlag::for_item(Uuid::new_v4());
        flag.cancel();
        tokio::time::timeout(Duration::from_millis(50), flag.cancelled())
            .await
            .unwrap();
    }
}
