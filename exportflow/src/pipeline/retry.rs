//! Retry policy with optional backoff and jitter.
//!
//! A failed attempt is re-run only when its error kind is retryable
//! (see [`ErrorKind::is_retryable`](crate::errors::ErrorKind::is_retryable)).
//! Configuration and statement failures end the step on the first attempt.

use crate::errors::ExportflowError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Retry immediately.
    #[default]
    None,
    /// delay = base
    Constant,
    /// delay = base * attempt
    Linear,
    /// delay = base * 2^(attempt - 1)
    Exponential,
}

/// Jitter applied on top of the backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// Use the computed delay as is.
    #[default]
    None,
    /// Random from 0 to delay.
    Full,
    /// Half fixed, half random.
    Equal,
}

/// How often, and how patiently, a step's work is re-run.
///
/// `retries = 0` runs the work exactly once; `retries = 2` allows up to three
/// attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Additional attempts after the first.
    pub retries: u32,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Base delay in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            backoff: BackoffStrategy::None,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter: JitterStrategy::None,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// A policy allowing `retries` immediate re-runs.
    #[must_use]
    pub fn retries(retries: u32) -> Self {
        Self {
            retries,
            ..Self::default()
        }
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter = strategy;
        self
    }

    /// Total attempts allowed.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Delay before the retry that follows failed attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms;
        let max = self.max_delay_ms;

        let delay = match self.backoff {
            BackoffStrategy::None => 0,
            BackoffStrategy::Constant => base.min(max),
            BackoffStrategy::Linear => base.saturating_mul(u64::from(attempt)).min(max),
            BackoffStrategy::Exponential => {
                let exponent = attempt.saturating_sub(1);
                base.saturating_mul(2u64.saturating_pow(exponent)).min(max)
            }
        };

        let jittered = match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }

    /// Runs `operation` under this policy.
    pub async fn run<T, F, Fut>(&self, label: &str, operation: F) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExportflowError>>,
    {
        self.run_observed(label, operation, |_| {}).await
    }

    /// Runs `operation` under this policy, calling `on_retry` before each
    /// re-run.
    ///
    /// Intermediate failures are logged at warn. When attempts run out, or
    /// the error is not retryable, the last error is returned.
    pub async fn run_observed<T, F, Fut, H>(
        &self,
        label: &str,
        mut operation: F,
        mut on_retry: H,
    ) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExportflowError>>,
        H: FnMut(&RetryNotice<'_>),
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        attempts: attempt,
                    }
                }
                Err(error) => {
                    if !error.is_retryable() || attempt >= max_attempts {
                        return Attempted {
                            result: Err(error),
                            attempts: attempt,
                        };
                    }

                    let delay = self.delay_after(attempt);
                    warn!(
                        step = %label,
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "Attempt failed, retrying"
                    );
                    on_retry(&RetryNotice {
                        attempt,
                        max_attempts,
                        error: &error,
                        delay,
                    });
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// Passed to the observer of [`RetryPolicy::run_observed`] before a re-run.
#[derive(Debug)]
pub struct RetryNotice<'a> {
    /// The attempt that just failed (1-based).
    pub attempt: u32,
    /// Total attempts allowed.
    pub max_attempts: u32,
    /// Its error.
    pub error: &'a ExportflowError,
    /// Delay before the next attempt.
    pub delay: Duration,
}

/// Final result of a retried operation.
#[derive(Debug)]
pub struct Attempted<T> {
    /// The last attempt's result.
    pub result: Result<T, ExportflowError>,
    /// Attempts made.
    pub attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ConfigurationError, ConnectionError, ProcessExecutionError};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> ExportflowError {
        ProcessExecutionError::exit("dbt build", 1, vec![]).into()
    }

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retries, 0);
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.backoff, BackoffStrategy::None);
        assert_eq!(policy.delay_after(1), Duration::ZERO);
    }

    #[test]
    fn test_delay_strategies_without_jitter() {
        let exponential = RetryPolicy::retries(3)
            .with_backoff(BackoffStrategy::Exponential)
            .with_base_delay_ms(100);
        assert_eq!(exponential.delay_after(1), Duration::from_millis(100));
        assert_eq!(exponential.delay_after(2), Duration::from_millis(200));
        assert_eq!(exponential.delay_after(3), Duration::from_millis(400));

        let linear = RetryPolicy::retries(3)
            .with_backoff(BackoffStrategy::Linear)
            .with_base_delay_ms(100);
        assert_eq!(linear.delay_after(3), Duration::from_millis(300));

        let constant = RetryPolicy::retries(3)
            .with_backoff(BackoffStrategy::Constant)
            .with_base_delay_ms(100);
        assert_eq!(constant.delay_after(7), Duration::from_millis(100));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = RetryPolicy::retries(20)
            .with_backoff(BackoffStrategy::Exponential)
            .with_base_delay_ms(1000)
            .with_max_delay_ms(5000);
        assert_eq!(policy.delay_after(11), Duration::from_millis(5000));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let full = RetryPolicy::retries(1)
            .with_backoff(BackoffStrategy::Constant)
            .with_base_delay_ms(100)
            .with_jitter(JitterStrategy::Full);
        let equal = full.clone().with_jitter(JitterStrategy::Equal);
        for _ in 0..50 {
            assert!(full.delay_after(1) <= Duration::from_millis(100));
            let d = equal.delay_after(1);
            assert!(d >= Duration::from_millis(50) && d <= Duration::from_millis(100));
        }
    }

    #[tokio::test]
    async fn test_zero_retries_runs_once() {
        let calls = AtomicU32::new(0);
        let attempted: Attempted<()> = RetryPolicy::none()
            .run("step", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(attempted.attempts, 1);
        assert!(attempted.result.is_err());
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let attempted = RetryPolicy::retries(2)
            .run("step", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(ExportflowError::from(ConnectionError::new("db", "reset")))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(attempted.result.unwrap(), 3);
        assert_eq!(attempted.attempts, 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error_and_notifies() {
        let calls = AtomicU32::new(0);
        let mut notices = Vec::new();
        let attempted: Attempted<()> = RetryPolicy::retries(2)
            .run_observed(
                "dbt-build",
                || async {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    Err(ProcessExecutionError::exit("dbt build", i32::try_from(n).unwrap(), vec![]).into())
                },
                |notice| notices.push((notice.attempt, notice.max_attempts)),
            )
            .await;

        assert_eq!(attempted.attempts, 3);
        assert_eq!(notices, vec![(1, 3), (2, 3)]);
        let err = attempted.result.unwrap_err();
        assert!(err.to_string().contains("return code 3"));
    }

    #[tokio::test]
    async fn test_fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let attempted: Attempted<()> = RetryPolicy::retries(5)
            .run("export", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ConfigurationError::missing_field("MINIO_ENDPOINT").into())
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(attempted.attempts, 1);
    }

    #[tokio::test]
    async fn test_backoff_sleeps_between_attempts() {
        let start = std::time::Instant::now();
        let attempted: Attempted<()> = RetryPolicy::retries(1)
            .with_backoff(BackoffStrategy::Constant)
            .with_base_delay_ms(50)
            .run("step", || async { Err(transient()) })
            .await;
        assert_eq!(attempted.attempts, 2);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
