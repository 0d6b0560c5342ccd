use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::RetryConfig;

/// Exponential backoff for the session bootstrap calls. Orchestrated
/// exchanges are never retried here.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: usize,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            config.initial_backoff_ms,
            config.max_backoff_ms,
        )
    }

    /// Retry only the errors `is_retryable` accepts; anything else is
    /// returned at once.
    pub async fn retry_when<F, Fut, T, E, P>(
        &self,
        operation_name: &str,
        is_retryable: P,
        mut f: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        let mut backoff = self.initial_backoff;

        loop {
            match f().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!(
                            operation = operation_name,
                            attempts = attempt + 1,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(result);
                }
                Err(e) if !is_retryable(&e) => {
                    warn!(operation = operation_name, error = %e, "Operation failed, not retryable");
                    return Err(e);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        warn!(
                            operation = operation_name,
                            attempts = attempt,
                            error = %e,
                            "Operation failed after max retries"
                        );
                        return Err(e);
                    }

                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Operation failed, retrying"
                    );

                    sleep(backoff).await;
                    backoff = std::cmp::min(backoff * 2, self.max_backoff);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(3, 1, 4);
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let result: Result<&str, String> = policy
            .retry_when("upload", |_| true, || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("503".to_string())
                    } else {
                        Ok("file_1")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "file_1");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let policy = RetryPolicy::new(2, 1, 2);
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let result: Result<(), String> = policy
            .retry_when("upload", |_| true, || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("unavailable".to_string())
                }
            })
            .await;

        assert_eq!(result.unwrap_err(), "unavailable");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let policy = RetryPolicy::new(5, 1, 2);
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let result: Result<(), u16> = policy
            .retry_when(
                "upload",
                |status: &u16| *status >= 500,
                || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err(400)
                    }
                },
            )
            .await;

        assert_eq!(result.unwrap_err(), 400);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
