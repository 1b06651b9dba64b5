use super::breaker::Breaker;
use super::types::RetryConfig;
use crate::error::CallError;
use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use std::error::Error as StdError;
use std::future::Future;
use tracing::{debug, warn};

/// Retry with exponential backoff, layered outside a [`Breaker`].
///
/// Every attempt is a separate breaker call. A `BreakerOpen` rejection ends
/// the loop immediately; only errors from the wrapped operation are retried.
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a new retry executor
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Call `f` through `breaker`, retrying every operation error
    pub async fn call<F, Fut, T, E>(&self, breaker: &Breaker, f: F) -> Result<T, CallError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + 'static,
    {
        self.call_with_predicate(breaker, f, |_| true).await
    }

    /// Call `f` through `breaker`, retrying only errors matching `should_retry`
    pub async fn call_with_predicate<F, Fut, T, E, P>(
        &self,
        breaker: &Breaker,
        mut f: F,
        should_retry: P,
    ) -> Result<T, CallError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + 'static,
        P: Fn(&E) -> bool,
    {
        let mut backoff = self.create_backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(
                breaker = %breaker.name(),
                attempt,
                max_retries = self.config.max_retries,
                "Executing call"
            );

            let e = match breaker.call(&mut f).await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!(attempt, "Call succeeded after retries");
                    }
                    return Ok(result);
                }
                Err(CallError::Open(open)) => {
                    debug!(attempt, error = %open, "Breaker rejected call, not retrying");
                    return Err(CallError::Open(open));
                }
                Err(CallError::Inner(e)) => e,
            };

            if !should_retry(&e) {
                debug!(attempt, error = %e, "Error not retryable");
                return Err(CallError::Inner(e));
            }

            if attempt > self.config.max_retries {
                warn!(
                    attempt,
                    max_retries = self.config.max_retries,
                    error = %e,
                    "Call failed after max retries"
                );
                return Err(CallError::Inner(e));
            }

            match backoff.next_backoff() {
                Some(wait) => {
                    debug!(
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "Call failed, retrying after backoff"
                    );
                    tokio::time::sleep(wait).await;
                }
                None => {
                    warn!(attempt, error = %e, "Backoff exhausted");
                    return Err(CallError::Inner(e));
                }
            }
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.initial_backoff())
            .with_max_interval(self.config.max_backoff())
            .with_multiplier(self.config.backoff_multiplier)
            .with_max_elapsed_time(None) // attempts are capped by max_retries
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::{BreakerConfig, BreakerState};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use thiserror::Error;

    #[derive(Debug, Error, PartialEq)]
    enum FetchError {
        #[error("transient")]
        Transient,
        #[error("permanent")]
        Permanent,
    }

    fn fast_retries(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_ms: 10,
            max_backoff_ms: 100,
            backoff_multiplier: 2.0,
        }
    }

    fn tolerant_breaker() -> Breaker {
        Breaker::new(
            "fetch",
            BreakerConfig {
                failure_threshold: 10,
                ..Default::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_failures() {
        let executor = RetryExecutor::new(fast_retries(3));
        let breaker = tolerant_breaker();
        let attempts = Arc::new(AtomicU32::new(0));

        let result = executor
            .call(&breaker, || {
                let attempts = attempts.clone();
                async move {
                    let current = attempts.fetch_add(1, Ordering::SeqCst);
                    if current < 2 {
                        Err(FetchError::Transient)
                    } else {
                        Ok("success")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        let metrics = breaker.metrics();
        assert_eq!(metrics.failed_requests, 2);
        assert_eq!(metrics.successful_requests, 1);
        assert_eq!(metrics.consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_fails_after_max_attempts() {
        let executor = RetryExecutor::new(fast_retries(2));
        let breaker = tolerant_breaker();
        let attempts = Arc::new(AtomicU32::new(0));

        let result = executor
            .call(&breaker, || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(FetchError::Transient)
                }
            })
            .await;

        assert_eq!(result.unwrap_err().into_inner(), Some(FetchError::Transient));
        assert_eq!(attempts.load(Ordering::SeqCst), 3); // Initial + 2 retries
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_with_predicate() {
        let executor = RetryExecutor::new(fast_retries(3));
        let breaker = tolerant_breaker();
        let attempts = Arc::new(AtomicU32::new(0));

        let result = executor
            .call_with_predicate(
                &breaker,
                || {
                    let attempts = attempts.clone();
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>(FetchError::Permanent)
                    }
                },
                |e| *e != FetchError::Permanent,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_when_breaker_trips() {
        let executor = RetryExecutor::new(fast_retries(5));
        let breaker = Breaker::new(
            "fetch",
            BreakerConfig {
                failure_threshold: 2,
                ..Default::default()
            },
        );
        let attempts = Arc::new(AtomicU32::new(0));

        let result = executor
            .call(&breaker, || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(FetchError::Transient)
                }
            })
            .await;

        // Two failures trip the breaker, the third attempt is rejected
        assert!(result.unwrap_err().is_open());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(breaker.state(), BreakerState::Open);
    }
}
