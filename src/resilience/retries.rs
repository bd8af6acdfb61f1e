//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether an error is transient (retryable)
//! - Execute retries with exponential backoff + jitter
//! - Surface the last error unchanged once attempts run out
//!
//! # Design Decisions
//! - Known transient codes are always retryable; message heuristics cover untyped errors
//! - An open circuit is never retried, the breaker already said "don't bother"
//! - Jittered backoff prevents thundering herd
//! - The executor does not log; callers observe attempts through `on_retry`

use std::future::Future;
use std::time::Duration;

use crate::error::{Classify, RetriesExhaustedError};
use crate::resilience::backoff;

/// Codes retried by default: connection reset, timeout, refused, DNS, 429/503/504.
pub const DEFAULT_RETRYABLE_CODES: &[&str] = &[
    "ECONNRESET",
    "ETIMEDOUT",
    "ECONNREFUSED",
    "ENOTFOUND",
    "429",
    "503",
    "504",
];

/// Message fragments that mark an untyped error as transient.
pub const DEFAULT_MESSAGE_PATTERNS: &[&str] = &["timeout", "connection", "network", "unavailable"];

/// Retry configuration for one call site.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Jitter as a fraction of the base delay.
    pub jitter_ratio: f64,
    pub retryable_codes: Vec<String>,
    /// Lowercase fragments searched in the error message.
    pub message_patterns: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter_ratio: 0.25,
            retryable_codes: DEFAULT_RETRYABLE_CODES.iter().map(|c| c.to_string()).collect(),
            message_patterns: DEFAULT_MESSAGE_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl RetryPolicy {
    /// Whether `err` is worth another attempt.
    pub fn is_retryable<E: Classify + ?Sized>(&self, err: &E) -> bool {
        if err.is_circuit_open() {
            return false;
        }
        if let Some(decision) = err.retryable() {
            return decision;
        }
        if let Some(code) = err.code() {
            if self.retryable_codes.iter().any(|c| c.eq_ignore_ascii_case(&code)) {
                return true;
            }
        }
        let message = err.to_string().to_lowercase();
        self.message_patterns.iter().any(|p| message.contains(p.as_str()))
    }

    /// Un-jittered delay after failed attempt `attempt`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        backoff::base_delay(attempt, self.initial_delay, self.backoff_multiplier, self.max_delay)
    }

    /// Jittered delay after failed attempt `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        backoff::calculate_backoff(
            attempt,
            self.initial_delay,
            self.backoff_multiplier,
            self.max_delay,
            self.jitter_ratio,
        )
    }
}

struct Failure<E> {
    error: E,
    attempts: u32,
    exhausted: bool,
}

/// Executes work, retrying transient failures.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `work` until it succeeds, fails permanently, or attempts run out.
    ///
    /// The last error is returned unchanged.
    pub async fn execute<F, Fut, T, E>(&self, work: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        self.execute_with(work, |_, _, _| {}).await
    }

    /// Like `execute`, calling `on_retry(attempt, &error, delay)` before each sleep.
    pub async fn execute_with<F, Fut, T, E, R>(&self, work: F, on_retry: R) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
        R: FnMut(u32, &E, Duration),
    {
        self.run(work, on_retry).await.map_err(|failure| failure.error)
    }

    /// Like `execute`, but exhaustion is reported as `RetriesExhaustedError`.
    ///
    /// Non-retryable errors are still returned unchanged.
    pub async fn execute_reporting<F, Fut, T, E>(&self, work: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + std::error::Error + From<RetriesExhaustedError<E>> + 'static,
    {
        match self.run(work, |_, _, _| {}).await {
            Ok(value) => Ok(value),
            Err(Failure { error, attempts, exhausted: true }) => {
                Err(E::from(RetriesExhaustedError { attempts, source: error }))
            }
            Err(failure) => Err(failure.error),
        }
    }

    async fn run<F, Fut, T, E, R>(&self, mut work: F, mut on_retry: R) -> Result<T, Failure<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
        R: FnMut(u32, &E, Duration),
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let error = match work().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !self.policy.is_retryable(&error) {
                return Err(Failure { error, attempts: attempt, exhausted: false });
            }
            if attempt >= max_attempts {
                return Err(Failure { error, attempts: attempt, exhausted: true });
            }

            let delay = self.policy.delay_for(attempt);
            on_retry(attempt, &error, delay);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
