//! Retry around circuit breaker.
//!
//! Each retry attempt goes through the breaker on its own. Once the breaker
//! opens mid-loop the next attempt fails fast with `CircuitOpenError`, which
//! the retry policy treats as terminal.

use std::future::Future;
use std::sync::Arc;

use crate::error::{CircuitOpenError, Classify};
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerStats};
use crate::resilience::retries::{RetryExecutor, RetryPolicy};

/// Breaker-gated retry executor for one named dependency.
#[derive(Debug, Clone)]
pub struct ResilientExecutor {
    breaker: Arc<CircuitBreaker>,
    retry: RetryExecutor,
}

impl ResilientExecutor {
    pub fn new(breaker: Arc<CircuitBreaker>, policy: RetryPolicy) -> Self {
        Self {
            breaker,
            retry: RetryExecutor::new(policy),
        }
    }

    /// Name of the protected dependency.
    pub fn name(&self) -> &str {
        self.breaker.name()
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Run `work`, retrying transient failures while the breaker allows it.
    pub async fn execute<F, Fut, T, E>(&self, mut work: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + From<CircuitOpenError>,
    {
        let name = self.breaker.name();
        self.retry
            .execute_with(
                || {
                    let admitted = self.breaker.acquire().map(|permit| (permit, work()));
                    async move {
                        match admitted {
                            Ok((permit, call)) => self.breaker.observe(permit, call).await,
                            Err(open) => Err(E::from(open)),
                        }
                    }
                },
                |attempt, error, delay| {
                    tracing::warn!(
                        dependency = %name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying after transient failure"
                    );
                    metrics::record_retry_attempt(name);
                },
            )
            .await
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        self.breaker.stats()
    }

    pub fn reset(&self) {
        self.breaker.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{OperationError, ResilienceError};
    use crate::resilience::circuit_breaker::{CircuitBreakerOptions, CircuitState};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn executor(failure_threshold: u32, max_attempts: u32) -> ResilientExecutor {
        let breaker = Arc::new(CircuitBreaker::new(
            "evidence_store",
            CircuitBreakerOptions {
                failure_threshold,
                success_threshold: 1,
                open_duration: Duration::from_secs(30),
                monitoring_window: Duration::from_secs(60),
            },
        ));
        ResilientExecutor::new(
            breaker,
            RetryPolicy {
                max_attempts,
                ..RetryPolicy::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_from_transient_failure() {
        let executor = executor(5, 3);
        let calls = AtomicU32::new(0);

        let result = executor
            .execute(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ResilienceError::from(OperationError::with_code("ETIMEDOUT", "timeout")))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(executor.stats().state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_retrying_once_breaker_opens() {
        let executor = executor(2, 10);
        let calls = AtomicU32::new(0);

        let result: Result<(), ResilienceError> = executor
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ResilienceError::from(OperationError::with_code("503", "unavailable")))
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::CircuitOpen(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(executor.stats().state, CircuitState::Open);

        executor.reset();
        assert_eq!(executor.stats().state, CircuitState::Closed);
    }
}
