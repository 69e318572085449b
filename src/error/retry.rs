use std::fmt::Display;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{warn, debug, error};

/// Errors that may succeed when the same request is issued again.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Exponential backoff applied between retries of the *same* request.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt (default: 3)
    pub max_retries: u32,
    /// Wait before the first retry (default: 1s)
    pub base_delay: Duration,
    /// Growth factor between consecutive waits (default: 2.0)
    pub multiplier: f64,
    /// Upper bound for a single wait (default: 60s)
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_retries,
            base_delay,
            multiplier,
            ..Default::default()
        }
    }

    /// Wait before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let millis = self.base_delay.as_millis() as f64 * self.multiplier.powi(retry as i32);
        let capped = millis.min(self.max_delay.as_millis() as f64).max(0.0);
        Duration::from_millis(capped.round() as u64)
    }

    /// Every wait the policy would perform when all attempts fail.
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_retries).map(|retry| self.delay_for(retry)).collect()
    }
}

/// Run `operation`, retrying retryable failures with the policy's backoff.
/// Returns the last error once the retry budget is spent.
pub async fn with_retry<F, Fut, T, E>(
    operation_name: &str,
    policy: &RetryPolicy,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut retry = 0;

    loop {
        debug!(
            operation = operation_name,
            attempt = retry + 1,
            max_attempts = policy.max_retries + 1,
            "Executing operation with retry logic"
        );

        match operation().await {
            Ok(result) => {
                if retry > 0 {
                    debug!(
                        operation = operation_name,
                        attempt = retry + 1,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                if !error.is_retryable() {
                    warn!(
                        operation = operation_name,
                        attempt = retry + 1,
                        error = %error,
                        "Operation failed with non-retryable error"
                    );
                    return Err(error);
                }

                if retry >= policy.max_retries {
                    error!(
                        operation = operation_name,
                        attempts = retry + 1,
                        error = %error,
                        "Operation failed after all retry attempts"
                    );
                    return Err(error);
                }

                let delay = policy.delay_for(retry);
                warn!(
                    operation = operation_name,
                    attempt = retry + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Operation failed, retrying after delay"
                );

                sleep(delay).await;
                retry += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use std::sync::{Arc, Mutex};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_default_schedule_doubles_from_one_second() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.schedule(),
            vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(3),
            ..Default::default()
        };
        assert_eq!(policy.delay_for(5), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_follow_schedule() {
        let attempts: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
        let recorded = attempts.clone();

        let result = with_retry("fetch_chart", &RetryPolicy::default(), move || {
            let recorded = recorded.clone();
            async move {
                recorded.lock().unwrap().push(Instant::now());
                Err::<(), FetchError>(FetchError::RateLimited)
            }
        })
        .await;

        assert_eq!(result, Err(FetchError::RateLimited));

        let attempts = attempts.lock().unwrap();
        assert_eq!(attempts.len(), 4);
        let gaps: Vec<Duration> = attempts.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_success_after_failures() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let counter = attempt_count.clone();

        let result = with_retry("fetch_pools", &RetryPolicy::default(), move || {
            let count = counter.clone();
            async move {
                if count.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(FetchError::Transient("503".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_not_retried() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let counter = attempt_count.clone();

        let result = with_retry("fetch_chart", &RetryPolicy::default(), move || {
            let count = counter.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<(), FetchError>(FetchError::Malformed("not json".to_string()))
            }
        })
        .await;

        assert!(matches!(result, Err(FetchError::Malformed(_))));
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }
}
