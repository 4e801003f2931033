use super::envelope::{FaultKind, StorageFault, StorageOutcome};
use std::future::Future;
use std::time::Duration;

/// Backoff curve between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * attempt` — reads, where contention is cheap.
    Linear,
    /// `base * 2^(attempt-1)` — writes, to back off harder under pressure.
    Exponential,
}

/// Shared retry policy for storage operations.
///
/// Only transient faults (`FaultKind::Io`) are retried; `NotFound` and
/// `Cancelled` short-circuit immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff: Backoff::Linear,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff: Backoff::Exponential,
        }
    }

    /// Delay to sleep after the given 1-based attempt fails.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Linear => self.base_delay * attempt,
            Backoff::Exponential => self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1)),
        }
    }

    /// Drive `op` to completion under this policy, timing the whole run.
    ///
    /// `elapsed` in the returned outcome covers every attempt and every
    /// backoff sleep, not just the final attempt.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> StorageOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StorageFault>>,
    {
        let started = tokio::time::Instant::now();
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(value) => return StorageOutcome::ok(value, started.elapsed()),
                Err(fault) if fault.kind == FaultKind::Io && attempt < self.max_attempts => {
                    tracing::warn!(
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        fault = %fault,
                        "transient storage fault, retrying"
                    );
                    tokio::time::sleep(self.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(fault) => return StorageOutcome::err(fault, started.elapsed()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn it_should_grow_delays_linearly() {
        let policy = RetryPolicy::linear(3, Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(300));
    }

    #[test]
    fn it_should_double_delays_exponentially() {
        let policy = RetryPolicy::exponential(4, Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn it_should_succeed_after_transient_failures_within_the_attempt_limit() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::linear(3, Duration::from_millis(10));

        let outcome = policy
            .run(|| {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(StorageFault::io("flaky disk"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.data, Some(3));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // Two backoff sleeps happened: 10ms + 20ms.
        assert!(outcome.elapsed >= Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn it_should_give_up_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::linear(3, Duration::from_millis(1));

        let outcome: StorageOutcome<()> = policy
            .run(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(StorageFault::io("still broken")) }
            })
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.fault_kind(), Some(FaultKind::Io));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn it_should_not_retry_not_found() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::linear(5, Duration::from_millis(1));

        let outcome: StorageOutcome<()> = policy
            .run(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(StorageFault::not_found("missing")) }
            })
            .await;

        assert!(!outcome.success);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
