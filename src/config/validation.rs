//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, durations > 0, multiplier >= 1)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ResilienceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::{CircuitBreakerSettings, ResilienceConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ResilienceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_breaker("circuit_breaker", &config.circuit_breaker.defaults, &mut errors);
    let mut names: Vec<_> = config.circuit_breaker.overrides.keys().collect();
    names.sort();
    for name in names {
        let settings = &config.circuit_breaker.overrides[name];
        validate_breaker(&format!("circuit_breaker.overrides.{name}"), settings, &mut errors);
    }

    let retry = &config.retry;
    if retry.max_attempts == 0 {
        errors.push(ValidationError::new("retry.max_attempts", "must be at least 1"));
    }
    if retry.backoff_multiplier < 1.0 {
        errors.push(ValidationError::new("retry.backoff_multiplier", "must be >= 1.0"));
    }
    if retry.initial_delay_ms > retry.max_delay_ms {
        errors.push(ValidationError::new(
            "retry.initial_delay_ms",
            "must not exceed retry.max_delay_ms",
        ));
    }
    if !(0.0..=1.0).contains(&retry.jitter_ratio) {
        errors.push(ValidationError::new("retry.jitter_ratio", "must be within [0, 1]"));
    }

    if config.idempotency.ttl_secs == 0 {
        errors.push(ValidationError::new("idempotency.ttl_secs", "must be greater than 0"));
    }
    if config.optimistic_lock.max_retries == 0 {
        errors.push(ValidationError::new("optimistic_lock.max_retries", "must be at least 1"));
    }
    if config.batch.batch_size == 0 {
        errors.push(ValidationError::new("batch.batch_size", "must be greater than 0"));
    }
    if config.observability.snapshot_interval_secs == 0 {
        errors.push(ValidationError::new(
            "observability.snapshot_interval_secs",
            "must be greater than 0",
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_breaker(prefix: &str, settings: &CircuitBreakerSettings, errors: &mut Vec<ValidationError>) {
    if settings.failure_threshold == 0 {
        errors.push(ValidationError::new(format!("{prefix}.failure_threshold"), "must be at least 1"));
    }
    if settings.success_threshold == 0 {
        errors.push(ValidationError::new(format!("{prefix}.success_threshold"), "must be at least 1"));
    }
    if settings.open_duration_ms == 0 {
        errors.push(ValidationError::new(format!("{prefix}.open_duration_ms"), "must be greater than 0"));
    }
    if settings.monitoring_window_ms == 0 {
        errors.push(ValidationError::new(format!("{prefix}.monitoring_window_ms"), "must be greater than 0"));
    }
}
