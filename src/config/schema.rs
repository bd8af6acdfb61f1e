//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! resilience layer. All types derive Serde traits for deserialization from
//! config files, and every section falls back to defaults when omitted.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::resilience::circuit_breaker::CircuitBreakerOptions;
use crate::resilience::retries::RetryPolicy;

/// Root configuration for the resilience layer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Default breaker settings plus per-dependency overrides.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Default retry policy.
    pub retry: RetryConfig,

    /// Idempotency cache settings.
    pub idempotency: IdempotencyConfig,

    /// Optimistic lock retry settings.
    pub optimistic_lock: OptimisticLockConfig,

    /// Batch processor settings.
    pub batch: BatchConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Circuit breaker settings for one dependency.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that trip the breaker.
    pub failure_threshold: u32,

    /// Consecutive half-open successes that close it again.
    pub success_threshold: u32,

    /// Time the breaker stays open before a probe, in milliseconds.
    pub open_duration_ms: u64,

    /// Failures older than this window are forgotten, in milliseconds.
    pub monitoring_window_ms: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_duration_ms: 60_000,
            monitoring_window_ms: 120_000,
        }
    }
}

impl CircuitBreakerSettings {
    /// Convert to the breaker's runtime options.
    pub fn to_options(&self) -> CircuitBreakerOptions {
        CircuitBreakerOptions {
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            open_duration: Duration::from_millis(self.open_duration_ms),
            monitoring_window: Duration::from_millis(self.monitoring_window_ms),
        }
    }
}

/// Breaker defaults and named overrides.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Settings used for any dependency without an override.
    #[serde(flatten)]
    pub defaults: CircuitBreakerSettings,

    /// Per-dependency settings keyed by breaker name.
    pub overrides: HashMap<String, CircuitBreakerSettings>,
}

impl CircuitBreakerConfig {
    /// Settings for the named dependency.
    pub fn settings_for(&self, name: &str) -> &CircuitBreakerSettings {
        self.overrides.get(name).unwrap_or(&self.defaults)
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds.
    pub initial_delay_ms: u64,

    /// Upper bound for the exponential delay in milliseconds.
    pub max_delay_ms: u64,

    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,

    /// Jitter added on top of the delay, as a fraction of it.
    pub jitter_ratio: f64,

    /// Error codes that are always retried.
    pub retryable_codes: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
            jitter_ratio: policy.jitter_ratio,
            retryable_codes: policy.retryable_codes,
        }
    }
}

impl RetryConfig {
    /// Convert to the retry executor's policy.
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter_ratio: self.jitter_ratio,
            retryable_codes: self.retryable_codes.clone(),
            ..RetryPolicy::default()
        }
    }
}

/// Idempotency cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    /// Lifetime of a memoized result in seconds.
    pub ttl_secs: u64,

    /// Minimum time between opportunistic sweeps in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            sweep_interval_secs: 60,
        }
    }
}

/// Optimistic lock retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OptimisticLockConfig {
    /// Read-modify-write cycles before giving up.
    pub max_retries: u32,

    /// Sleep unit between cycles in milliseconds (multiplied by the attempt).
    pub base_delay_ms: u64,
}

impl Default for OptimisticLockConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 50,
        }
    }
}

/// Batch processor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Operations per transaction.
    pub batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { batch_size: 100 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Interval between breaker snapshot log lines, in seconds.
    pub snapshot_interval_secs: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
            snapshot_interval_secs: 30,
        }
    }
}
