use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cooperative stop signal shared by every worker of a run
///
/// Waits (stagger, backoff) race against it through [`CancellationFlag::sleep`],
/// so raising it never leaves a worker parked until a timer fires.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<CancelState>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the flag is raised
    pub fn cancelled(&self) -> impl Future<Output = ()> + '_ {
        async move {
            loop {
                let notified = self.0.notify.notified();
                if self.is_cancelled() {
                    return;
                }
                notified.await;
            }
        }
    }

    /// Sleep for `duration` unless cancelled first
    ///
    /// Returns `false` when the wait was cut short by cancellation.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        if duration.is_zero() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_cancelled(),
            _ = self.cancelled() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_sleep_completes_without_cancel() {
        let flag = CancellationFlag::new();
        assert!(flag.sleep(Duration::from_millis(5)).await);
        assert!(flag.sleep(Duration::ZERO).await);
    }

    #[tokio::test]
    async fn test_cancel_wakes_a_long_sleep() {
        let flag = CancellationFlag::new();
        let trigger = flag.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        assert!(!flag.sleep(Duration::from_secs(10)).await);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_already_cancelled_returns_immediately() {
        let flag = CancellationFlag::new();
        flag.cancel();
        assert!(!flag.sleep(Duration::from_secs(10)).await);
        flag.cancelled().await;
    }
}
