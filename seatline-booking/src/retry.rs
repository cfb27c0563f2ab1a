//! Exponential backoff for re-running whole operations after transient failures.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Backoff settings.
///
/// Defaults: 3 retries, 100ms initial delay, 5s cap, doubling each retry.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// `initial_delay * multiplier^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        Duration::from_millis(delay_ms as u64).min(self.max_delay)
    }
}

/// Runs `operation` until it succeeds, fails with an error `is_retryable` rejects,
/// or the policy runs out of retries. The last error is returned.
pub async fn retry_with_backoff<F, Fut, T, E, R>(
    policy: &RetryPolicy,
    is_retryable: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    info!(attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) if attempt < policy.max_retries && is_retryable(&err) => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "Operation failed, retrying");
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn instant() -> RetryPolicy {
        RetryPolicy::default().initial_delay(Duration::ZERO)
    }

    #[test]
    fn test_delay_grows_and_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(20), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_recovers_from_transient_failures() {
        let calls = AtomicUsize::new(0);
        let result = retry_with_backoff(&instant(), |_: &String| true, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err("flaky".to_string())
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), String> = retry_with_backoff(&instant().max_retries(2), |_: &String| true, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("down".to_string())
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), String> = retry_with_backoff(&instant(), |e: &String| e != "forbidden", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("forbidden".to_string())
        })
        .await;

        assert_eq!(result, Err("forbidden".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
