//! Bounded retry with exponential backoff for transient failures.
//!
//! Only errors for which [`Error::is_transient`] holds are retried; anything
//! else is returned on first occurrence.

use std::future::Future;
use std::time::Duration;

use crate::config::HttpConfig;
use crate::error::Result;

/// Upper bound for a single backoff sleep.
const MAX_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    // ---
    /// Retries after the first attempt.
    pub max_retries: u32,

    /// Delay before the first retry; doubled for each following one.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    pub fn from_http(cfg: &HttpConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base_delay: cfg.retry_base_delay,
        }
    }

    /// Sleep before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        // ---
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(MAX_DELAY)
    }
}

/// Run `op` until it succeeds, fails permanently, or retries run out.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    // ---
    let mut retries = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && retries < policy.max_retries => {
                retries += 1;
                let delay = policy.delay_for(retries);
                tracing::warn!(
                    error = %e,
                    retry = retries,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "{what} failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if retries > 0 {
                    tracing::error!(error = %e, retries, "{what} failed after retries");
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::error::Error;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
        }
    }

    fn unavailable() -> Error {
        Error::Upstream {
            service: "weather API",
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: String::new(),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        // ---
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(2));
        assert_eq!(policy.delay_for(10), MAX_DELAY);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_until_success() {
        // ---
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry(fast(3), "weather request", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(unavailable())
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        // ---
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = with_retry(fast(2), "weather request", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(unavailable())
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        // ---
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = with_retry(fast(5), "token refresh", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Upstream {
                service: "token service",
                status: StatusCode::UNAUTHORIZED,
                body: "invalid_grant".into(),
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
