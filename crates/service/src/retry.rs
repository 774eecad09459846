//! Fixed-interval retry for connection setup.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{error, info, warn};

/// How often, and how many times, to retry a failing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    interval: Duration,
    max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Retry forever, waiting `interval` between attempts.
    #[must_use]
    pub const fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }

    /// Give up after `max_attempts` attempts (at least one is always made).
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(if max_attempts == 0 { 1 } else { max_attempts });
        self
    }

    /// Wait between attempts.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Attempt cap, if any.
    #[must_use]
    pub const fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Run `op` until it succeeds or the attempts run out.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt once `max_attempts` is reached.
    pub async fn retry<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt: u32 = 1;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(operation, attempt, "Succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if self.max_attempts.is_some_and(|max| attempt >= max) {
                        error!(operation, attempt, error = %e, "Giving up");
                        return Err(e);
                    }
                    warn!(
                        operation,
                        attempt,
                        error = %e,
                        retry_in = ?self.interval,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(self.interval).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(1);

    #[tokio::test]
    async fn test_first_success_returns_immediately() {
        let mut calls = 0;
        let result: Result<u32, String> = RetryPolicy::fixed(TICK)
            .retry("op", || {
                calls += 1;
                async { Ok(7) }
            })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let mut calls = 0;
        let result = RetryPolicy::fixed(TICK)
            .retry("op", || {
                calls += 1;
                let n = calls;
                async move {
                    if n < 3 {
                        Err(format!("failure {n}"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_gives_up_with_last_error() {
        let mut calls = 0;
        let result: Result<(), String> = RetryPolicy::fixed(TICK)
            .with_max_attempts(4)
            .retry("op", || {
                calls += 1;
                let n = calls;
                async move { Err(format!("failure {n}")) }
            })
            .await;
        assert_eq!(result, Err("failure 4".to_string()));
        assert_eq!(calls, 4);
    }

    #[tokio::test]
    async fn test_zero_max_attempts_still_tries_once() {
        let mut calls = 0;
        let result: Result<(), &str> = RetryPolicy::fixed(TICK)
            .with_max_attempts(0)
            .retry("op", || {
                calls += 1;
                async { Err("down") }
            })
            .await;
        assert_eq!(result, Err("down"));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_default_is_five_seconds_unbounded() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.interval(), Duration::from_secs(5));
        assert_eq!(policy.max_attempts(), None);
    }
}
