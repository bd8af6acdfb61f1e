//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: probing whether the dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold within monitoring window
//! Open → Half-Open: first call after open_duration elapsed
//! Half-Open → Closed: success_count >= success_threshold
//! Half-Open → Open: any probe failure
//! ```
//!
//! # Design Decisions
//! - Per-dependency circuit breaker (not global)
//! - Fail fast in Open state, the caller's work never runs
//! - State and counters live behind one mutex that is never held across `.await`
//! - Every transition starts a new generation; an outcome only counts against
//!   the generation that admitted its call

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::error::CircuitOpenError;
use crate::observability::metrics;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Stable lowercase name used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable per-breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerOptions {
    /// Failures in Closed that trip the breaker.
    pub failure_threshold: u32,
    /// Consecutive Half-Open successes that close it.
    pub success_threshold: u32,
    /// Time spent Open before a probe is let through.
    pub open_duration: Duration,
    /// Failures older than this are forgotten.
    pub monitoring_window: Duration,
}

impl Default for CircuitBreakerOptions {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_duration: Duration::from_secs(60),
            monitoring_window: Duration::from_secs(120),
        }
    }
}

/// Read-only snapshot of a breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    /// Time until the next probe is allowed, when Open.
    pub next_attempt_in: Option<Duration>,
}

/// Admission ticket returned by [`CircuitBreaker::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPermit {
    generation: u64,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    generation: u64,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
    next_attempt_time: Option<Instant>,
}

impl Inner {
    fn closed(generation: u64) -> Self {
        Self {
            state: CircuitState::Closed,
            generation,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
            next_attempt_time: None,
        }
    }
}

/// Three-state circuit breaker guarding one named dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    options: CircuitBreakerOptions,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, options: CircuitBreakerOptions) -> Self {
        let name = name.into();
        tracing::debug!(
            breaker = %name,
            failure_threshold = options.failure_threshold,
            success_threshold = options.success_threshold,
            open_duration_ms = options.open_duration.as_millis() as u64,
            "Circuit breaker created"
        );
        metrics::record_circuit_state(&name, CircuitState::Closed);
        Self {
            name,
            options,
            inner: Mutex::new(Inner::closed(0)),
        }
    }

    /// Name of the protected dependency.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Options this breaker was created with.
    pub fn options(&self) -> &CircuitBreakerOptions {
        &self.options
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Run `work` through the breaker, or fail fast with `CircuitOpenError`.
    pub async fn execute<F, Fut, T, E>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CircuitOpenError>,
    {
        let permit = self.acquire()?;
        self.observe(permit, work()).await
    }

    /// Await an already admitted call and record its outcome.
    pub(crate) async fn observe<Fut, T, E>(&self, permit: CallPermit, call: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        match call.await {
            Ok(value) => {
                self.record_success(permit);
                Ok(value)
            }
            Err(e) => {
                self.record_failure(permit);
                Err(e)
            }
        }
    }

    /// Admission check. Moves Open → Half-Open once the open duration elapsed.
    pub fn acquire(&self) -> Result<CallPermit, CircuitOpenError> {
        let mut inner = self.lock();
        if inner.state != CircuitState::Open {
            return Ok(CallPermit {
                generation: inner.generation,
            });
        }

        let now = Instant::now();
        match inner.next_attempt_time {
            Some(next) if now < next => {
                drop(inner);
                metrics::record_circuit_rejection(&self.name);
                Err(CircuitOpenError {
                    name: self.name.clone(),
                    retry_after: next - now,
                })
            }
            _ => {
                inner.state = CircuitState::HalfOpen;
                inner.success_count = 0;
                inner.generation += 1;
                let permit = CallPermit {
                    generation: inner.generation,
                };
                drop(inner);
                self.transitioned(CircuitState::Open, CircuitState::HalfOpen);
                Ok(permit)
            }
        }
    }

    /// Record a successful call admitted with `permit`.
    pub fn record_success(&self, permit: CallPermit) {
        let mut inner = self.lock();
        if self.is_stale(&inner, permit) {
            return;
        }
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.options.success_threshold {
                    *inner = Inner::closed(inner.generation + 1);
                    drop(inner);
                    self.transitioned(CircuitState::HalfOpen, CircuitState::Closed);
                }
            }
            // Open never admits, so a current permit cannot land here.
            CircuitState::Open => {}
        }
    }

    /// Record a failed call admitted with `permit`.
    pub fn record_failure(&self, permit: CallPermit) {
        let now = Instant::now();
        let mut inner = self.lock();
        if self.is_stale(&inner, permit) {
            return;
        }
        match inner.state {
            CircuitState::Closed => {
                if let Some(last) = inner.last_failure_time {
                    if now.duration_since(last) > self.options.monitoring_window {
                        inner.failure_count = 0;
                    }
                }
                inner.failure_count += 1;
                inner.last_failure_time = Some(now);
                if inner.failure_count >= self.options.failure_threshold {
                    self.trip(&mut inner, now);
                    let failures = inner.failure_count;
                    drop(inner);
                    tracing::warn!(breaker = %self.name, failures, "Failure threshold reached");
                    self.transitioned(CircuitState::Closed, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                inner.last_failure_time = Some(now);
                self.trip(&mut inner, now);
                drop(inner);
                tracing::warn!(breaker = %self.name, "Probe failed, reopening circuit");
                self.transitioned(CircuitState::HalfOpen, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Force Closed with zero counters.
    pub fn reset(&self) {
        let previous = {
            let mut inner = self.lock();
            let previous = inner.state;
            *inner = Inner::closed(inner.generation + 1);
            previous
        };
        tracing::info!(breaker = %self.name, from = %previous, "Circuit breaker reset");
        if previous != CircuitState::Closed {
            metrics::record_circuit_transition(&self.name, previous, CircuitState::Closed);
        }
    }

    /// Snapshot of state and counters.
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.lock();
        let next_attempt_in = match (inner.state, inner.next_attempt_time) {
            (CircuitState::Open, Some(next)) => Some(next.saturating_duration_since(Instant::now())),
            _ => None,
        };
        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            next_attempt_in,
        }
    }

    /// True unless the breaker is Open.
    pub fn is_healthy(&self) -> bool {
        self.state() != CircuitState::Open
    }

    fn is_stale(&self, inner: &Inner, permit: CallPermit) -> bool {
        if permit.generation == inner.generation {
            return false;
        }
        tracing::trace!(
            breaker = %self.name,
            admitted = permit.generation,
            current = inner.generation,
            "Ignoring outcome of a call admitted before the last transition"
        );
        true
    }

    fn trip(&self, inner: &mut Inner, now: Instant) {
        inner.state = CircuitState::Open;
        inner.generation += 1;
        inner.success_count = 0;
        inner.next_attempt_time = Some(now + self.options.open_duration);
    }

    fn transitioned(&self, from: CircuitState, to: CircuitState) {
        tracing::info!(breaker = %self.name, from = %from, to = %to, "Circuit breaker state transition");
        metrics::record_circuit_transition(&self.name, from, to);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
