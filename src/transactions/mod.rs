//! Transactional safety primitives.
//!
//! This module provides:
//! - Idempotent execution keyed by a caller-supplied key
//! - Optimistic-concurrency retry for versioned records
//! - Chunked batch execution against a transactional store
//! - Sagas with reverse-order compensation

pub mod batch;
pub mod idempotency;
pub mod optimistic;
pub mod saga;

pub use batch::{BatchError, BatchOperation, BatchProcessor, BatchReport, TransactionalStore};
pub use idempotency::{IdempotencyCache, IdempotencyRecord};
pub use optimistic::{ensure_version, OptimisticLock, Versioned};
pub use saga::{Saga, SagaError, SagaState};
