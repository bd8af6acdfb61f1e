//! Resilience and transactional-safety layer for the GRC platform.
//!
//! # Architecture Overview
//!
//! ```text
//!     Application code (services, API handlers)
//!            │
//!            ▼
//!     ┌──────────────────────────── ResilienceContext ───────────────────────────┐
//!     │                                                                          │
//!     │  resilience                              transactions                    │
//!     │  ┌──────────────────┐                    ┌────────────────────────────┐  │
//!     │  │ ResilientExecutor│──▶ RetryExecutor   │ IdempotencyCache           │  │
//!     │  │                  │──▶ CircuitBreaker  │ OptimisticLock             │  │
//!     │  └──────────────────┘        ▲           │ BatchProcessor ──▶ store   │  │
//!     │  CircuitBreakerRegistry ─────┘           │ Saga (compensation)        │  │
//!     │                                          └────────────────────────────┘  │
//!     │                                                                          │
//!     │  Cross-cutting: config · error · observability · lifecycle               │
//!     └──────────────────────────────────────────────────────────────────────────┘
//!            │
//!            ▼
//!     Downstream dependencies (database, external APIs)
//! ```
//!
//! Every primitive is generic over the caller's error type and only asks for
//! the classification it needs (`error::Classify`).

pub mod config;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod transactions;

pub use config::ResilienceConfig;
pub use context::{ResilienceContext, ResilienceSnapshot};
pub use error::{Classify, ResilienceError};
pub use lifecycle::Shutdown;
