//! Retry policy with exponential backoff, used by the KV client and the
//! message publisher's own client-level retry (§4.3 `RedisRetryMax`,
//! §6 `KAFKA_RETRY_MAX`).

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy with exponential backoff configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: usize,
        initial_backoff_ms: u64,
        max_backoff_ms: u64,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms,
            max_backoff_ms,
            backoff_multiplier,
        }
    }

    /// Backoff duration for a given (zero-indexed) attempt number.
    pub fn backoff_duration(&self, attempt: usize) -> Duration {
        let backoff_ms = (self.initial_backoff_ms as f64
            * self.backoff_multiplier.powi(attempt as i32))
        .min(self.max_backoff_ms as f64) as u64;
        Duration::from_millis(backoff_ms)
    }

    /// Runs `operation` until it succeeds or `max_attempts` is reached.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!("operation succeeded after {} retries", attempt);
                    }
                    return Ok(result);
                }
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        warn!(
                            "operation failed after {} attempts: {}",
                            self.max_attempts, err
                        );
                        return Err(err);
                    }
                    let backoff = self.backoff_duration(attempt - 1);
                    warn!(
                        "operation failed (attempt {}/{}): {}. retrying in {:?}",
                        attempt, self.max_attempts, err, backoff
                    );
                    sleep(backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn default_policy_matches_spec_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_backoff_ms, 100);
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_duration(0).as_millis(), 100);
        assert_eq!(policy.backoff_duration(1).as_millis(), 200);
        assert_eq!(policy.backoff_duration(2).as_millis(), 400);
        let capped = RetryPolicy::new(10, 1000, 3000, 3.0);
        assert_eq!(capped.backoff_duration(5).as_millis(), 3000);
    }

    #[tokio::test]
    async fn execute_retries_until_success() {
        let policy = RetryPolicy::new(5, 1, 2, 1.0);
        let attempts = Arc::new(AtomicUsize::new(0));
        let a = attempts.clone();
        let result: Result<u32, &str> = policy
            .execute(|| {
                let a = a.clone();
                async move {
                    let n = a.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err("transient")
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn execute_gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(2, 1, 2, 1.0);
        let result: Result<u32, &str> = policy.execute(|| async { Err("always fails") }).await;
        assert_eq!(result, Err("always fails"));
    }
}
