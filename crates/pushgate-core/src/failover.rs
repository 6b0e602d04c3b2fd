//! Bounded retry with exponential backoff.
//!
//! The operation receives its attempt index so callers can rotate to a
//! different provider instance on each try.

use std::{fmt::Display, future::Future, time::Duration};

use tracing::warn;

/// Errors that may succeed when tried again.
pub trait Retryable {
    /// Whether another attempt could succeed.
    fn is_retryable(&self) -> bool;
}

/// Attempt budget and backoff bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailoverPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl FailoverPolicy {
    /// Policy with `max_attempts` and the default delays.
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self { max_attempts, ..Self::default() }
    }

    /// Delay after the failure of attempt `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for FailoverPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
        }
    }
}

/// Runs an operation until it succeeds, fails permanently, or the attempt
/// budget is spent.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailoverInvoker {
    policy: FailoverPolicy,
}

impl FailoverInvoker {
    /// Invoker following `policy`.
    pub fn new(policy: FailoverPolicy) -> Self {
        Self { policy }
    }

    /// The policy in force.
    pub fn policy(&self) -> &FailoverPolicy {
        &self.policy
    }

    /// Call `operation` with attempt indices `0..max_attempts`.
    ///
    /// Returns the first success, the first non-retryable error, or the
    /// error of the last attempt.
    pub async fn invoke<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if !error.is_retryable() || attempt + 1 >= attempts => return Err(error),
                Err(error) => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(attempt, max_attempts = attempts, ?delay, %error, "attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use super::*;
    use crate::error::QueueError;

    fn unavailable() -> QueueError {
        QueueError::Unavailable("down".to_owned())
    }

    #[test]
    fn delay_doubles_and_caps() {
        let policy = FailoverPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for(40), Duration::from_millis(350));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_attempt_cap_with_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let invoker = FailoverInvoker::new(FailoverPolicy::with_attempts(3));

        let result: Result<(), QueueError> = invoker
            .invoke(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(QueueError::Unavailable(format!("attempt {attempt}"))) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result, Err(QueueError::Unavailable("attempt 2".to_owned())));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_first_success() {
        let invoker = FailoverInvoker::new(FailoverPolicy::with_attempts(5));

        let result = invoker
            .invoke(|attempt| async move { if attempt < 2 { Err(unavailable()) } else { Ok(attempt) } })
            .await;

        assert_eq!(result, Ok(2));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let invoker = FailoverInvoker::new(FailoverPolicy::with_attempts(5));

        let result: Result<(), QueueError> = invoker
            .invoke(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(QueueError::UnknownProvider("x".to_owned())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_still_calls_once() {
        let invoker = FailoverInvoker::new(FailoverPolicy::with_attempts(0));
        let result: Result<(), QueueError> = invoker.invoke(|_| async { Err(unavailable()) }).await;
        assert_eq!(result, Err(unavailable()));
    }
}
