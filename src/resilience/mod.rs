//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a dependency:
//!     → executor.rs (one ResilientExecutor per dependency name)
//!     → retries.rs (classify failure, back off, try again)
//!     → circuit_breaker.rs (admit or fail fast, track outcome)
//!     → registry.rs (shared breaker per dependency name)
//! ```
//!
//! # Design Decisions
//! - Every retry attempt passes through the breaker individually
//! - An open breaker is terminal for the retry loop
//! - Breakers are owned by an explicitly constructed registry, never a global
//! - All resilience logic is composable: breaker and retry work standalone

pub mod backoff;
pub mod circuit_breaker;
pub mod executor;
pub mod registry;
pub mod retries;

pub use circuit_breaker::{CallPermit, CircuitBreaker, CircuitBreakerOptions, CircuitBreakerStats, CircuitState};
pub use executor::ResilientExecutor;
pub use registry::CircuitBreakerRegistry;
pub use retries::{RetryExecutor, RetryPolicy};
