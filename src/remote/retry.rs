use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::config::RemoteConfig;
use crate::error::RemoteError;
use crate::pipeline::CancellationFlag;

/// Bounded exponential backoff with jitter for quota-limited calls
///
/// Only failures classified by [`RemoteError::is_quota`] are retried;
/// anything else is returned immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_jitter: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_jitter,
        }
    }

    pub fn from_config(config: &RemoteConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_jitter_ms),
        )
    }

    /// No waiting between attempts
    pub fn immediate(max_retries: u32) -> Self {
        Self::new(max_retries, Duration::ZERO, Duration::ZERO)
    }

    /// Deterministic part of the wait before retry number `attempt + 1`
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// `base * 2^attempt` plus uniform jitter in `[0, max_jitter]`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.base_delay_for(attempt) + Duration::from_millis(jitter)
    }

    /// Run `operation`, retrying quota failures up to `max_retries` times
    ///
    /// The closure receives the zero-based attempt number.
    pub async fn run<T, F, Fut>(&self, operation: F) -> Result<T, RemoteError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        self.run_until_cancelled(&CancellationFlag::new(), operation).await
    }

    /// Like [`RetryPolicy::run`], but a raised `cancel` ends the backoff wait
    /// and prevents further attempts with [`RemoteError::Cancelled`]
    pub async fn run_until_cancelled<T, F, Fut>(
        &self,
        cancel: &CancellationFlag,
        mut operation: F,
    ) -> Result<T, RemoteError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(RemoteError::Cancelled);
            }
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_quota() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "Remote quota hit (attempt {}/{}), retrying in {}ms: {}",
                        attempt + 1,
                        self.max_retries + 1,
                        delay.as_millis(),
                        err
                    );
                    if !cancel.sleep(delay).await {
                        return Err(RemoteError::Cancelled);
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RemoteConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay_for(0), Duration::from_millis(2000));
        assert_eq!(policy.base_delay_for(1), Duration::from_millis(4000));
        assert_eq!(policy.base_delay_for(2), Duration::from_millis(8000));

        for attempt in 0..3 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= policy.base_delay_for(attempt));
            assert!(delay <= policy.base_delay_for(attempt) + Duration::from_millis(1000));
        }
    }

    #[tokio::test]
    async fn test_quota_errors_retry_until_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::immediate(3)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RemoteError::Http { status: 429, message: String::new() }) }
            })
            .await;

        assert!(result.unwrap_err().is_quota());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::immediate(3)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RemoteError::Http { status: 500, message: "boom".into() }) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_quota() {
        let result = RetryPolicy::immediate(3)
            .run(|attempt| async move {
                if attempt < 2 {
                    Err(RemoteError::Quota { message: "RESOURCE_EXHAUSTED".into() })
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cancel_cuts_backoff_short() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationFlag::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let policy = RetryPolicy::new(3, Duration::from_secs(30), Duration::ZERO);
        let started = tokio::time::Instant::now();
        let result: Result<(), _> = policy
            .run_until_cancelled(&cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RemoteError::Quota { message: "429".into() }) }
            })
            .await;

        assert!(matches!(result, Err(RemoteError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_no_attempt_once_cancelled() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationFlag::new();
        cancel.cancel();

        let result: Result<(), _> = RetryPolicy::immediate(3)
            .run_until_cancelled(&cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(RemoteError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
