//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Breakers, retries, sagas, caches and batches produce:
//!     → tracing events (structured fields: breaker, saga, attempt, ...)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Every state transition is logged with its identity fields
//! - Metrics are cheap (atomic increments) and safe without a recorder

pub mod logging;
pub mod metrics;
