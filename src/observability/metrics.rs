//! Metrics collection and exposition.
//!
//! # Metrics
//! - `resilience_circuit_transitions_total` (counter): breaker, from, to
//! - `resilience_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `resilience_circuit_rejections_total` (counter): calls failed fast
//! - `resilience_retry_attempts_total` (counter): retries per operation
//! - `resilience_idempotency_hits_total` (counter): memoized results served
//! - `resilience_idempotency_entries` (gauge): records held
//! - `resilience_saga_compensations_total` (counter): saga, outcome
//! - `resilience_batch_chunks_total` (counter): outcome
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; a no-op until a recorder is installed
//! - Prometheus exporter is optional and installed by the binary only

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus exporter with an HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a breaker state change.
pub fn record_circuit_transition(breaker: &str, from: CircuitState, to: CircuitState) {
    metrics::counter!(
        "resilience_circuit_transitions_total",
        "breaker" => breaker.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
    record_circuit_state(breaker, to);
}

/// Publish the current breaker state as a gauge.
pub fn record_circuit_state(breaker: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    metrics::gauge!("resilience_circuit_state", "breaker" => breaker.to_string()).set(value);
}

/// Count a call rejected by an open breaker.
pub fn record_circuit_rejection(breaker: &str) {
    metrics::counter!("resilience_circuit_rejections_total", "breaker" => breaker.to_string()).increment(1);
}

/// Count a retry of the named operation.
pub fn record_retry_attempt(operation: &str) {
    metrics::counter!("resilience_retry_attempts_total", "operation" => operation.to_string()).increment(1);
}

/// Count a memoized idempotent result being served.
pub fn record_idempotency_hit() {
    metrics::counter!("resilience_idempotency_hits_total").increment(1);
}

/// Publish the number of idempotency records held.
pub fn record_idempotency_entries(count: usize) {
    metrics::gauge!("resilience_idempotency_entries").set(count as f64);
}

/// Count a saga compensation and whether it succeeded.
pub fn record_saga_compensation(saga: &str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!(
        "resilience_saga_compensations_total",
        "saga" => saga.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Count a processed batch chunk.
pub fn record_batch_chunk(committed: bool) {
    let outcome = if committed { "committed" } else { "rolled_back" };
    metrics::counter!("resilience_batch_chunks_total", "outcome" => outcome).increment(1);
}
