//! Chunked batch execution against a transactional store.
//!
//! # Responsibilities
//! - Queue operations in enqueue order
//! - Run them in chunks, optionally one store transaction per chunk
//! - Stop at the first failing chunk and report what was committed
//!
//! # Design Decisions
//! - Operations are boxed `FnOnce` closures; each runs at most once
//! - A transaction is opened before a chunk leaves the queue
//! - A failed transactional chunk is rolled back and its operations are
//!   dropped, while operations never attempted stay queued for the next `execute`
//! - Rollback errors are logged; the operation's error is what the caller sees

use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::config::BatchConfig;
use crate::observability::metrics;

/// Store collaborator able to open, commit and roll back transactions.
pub trait TransactionalStore: Send + Sync {
    /// Opaque transaction handle forwarded to operations.
    type Tx: Send;
    type Error: std::error::Error + Send + 'static;

    fn begin(&self) -> BoxFuture<'_, Result<Self::Tx, Self::Error>>;
    fn commit(&self, tx: Self::Tx) -> BoxFuture<'_, Result<(), Self::Error>>;
    fn rollback(&self, tx: Self::Tx) -> BoxFuture<'_, Result<(), Self::Error>>;
}

/// One queued unit of work. Receives the chunk's transaction when one is open.
pub type BatchOperation<Tx, E> = Box<dyn for<'t> FnOnce(Option<&'t mut Tx>) -> BoxFuture<'t, Result<(), E>> + Send>;

/// Sizes of the chunks committed by one `execute`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub chunks: Vec<usize>,
}

impl BatchReport {
    /// Total operations committed.
    pub fn operations(&self) -> usize {
        self.chunks.iter().sum()
    }
}

/// A chunk failed; earlier chunks stay committed.
#[derive(Debug, Error)]
#[error("batch chunk {chunk_index} failed ({committed} committed, {discarded} discarded, {pending} pending): {source}")]
pub struct BatchError<E: std::error::Error + 'static> {
    /// Zero-based index of the failing chunk within this `execute`.
    pub chunk_index: usize,
    /// Operations persisted, including those a non-transactional chunk
    /// applied before its failing operation.
    pub committed: usize,
    /// Attempted operations that were dropped without being persisted.
    pub discarded: usize,
    /// Operations still queued.
    pub pending: usize,
    #[source]
    pub source: E,
}

struct ChunkFailure<E> {
    source: E,
    persisted: usize,
    discarded: usize,
}

/// Queue of operations drained in fixed-size chunks.
pub struct BatchProcessor<S: TransactionalStore> {
    store: Arc<S>,
    batch_size: usize,
    queue: VecDeque<BatchOperation<S::Tx, S::Error>>,
}

impl<S: TransactionalStore> BatchProcessor<S> {
    pub fn new(store: Arc<S>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            queue: VecDeque::new(),
        }
    }

    pub fn from_config(store: Arc<S>, config: &BatchConfig) -> Self {
        Self::new(store, config.batch_size)
    }

    /// Enqueue an operation.
    pub fn add<F>(&mut self, operation: F) -> &mut Self
    where
        F: for<'t> FnOnce(Option<&'t mut S::Tx>) -> BoxFuture<'t, Result<(), S::Error>> + Send + 'static,
    {
        self.queue.push_back(Box::new(operation));
        self
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Drop all pending operations. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }

    /// Drain the queue chunk by chunk.
    ///
    /// With a transaction, a failing chunk is rolled back as a whole. Without
    /// one, operations before the failure stay persisted and those after it
    /// go back to the front of the queue.
    pub async fn execute(&mut self, use_transaction: bool) -> Result<BatchReport, BatchError<S::Error>> {
        let mut report = BatchReport::default();

        while !self.queue.is_empty() {
            let chunk_index = report.chunks.len();
            let result = if use_transaction {
                self.run_transactional_chunk().await
            } else {
                self.run_plain_chunk().await
            };

            match result {
                Ok(size) => {
                    tracing::debug!(chunk_index, size, "Batch chunk committed");
                    metrics::record_batch_chunk(true);
                    report.chunks.push(size);
                }
                Err(failure) => {
                    tracing::warn!(
                        chunk_index,
                        persisted = failure.persisted,
                        discarded = failure.discarded,
                        pending = self.queue.len(),
                        error = %failure.source,
                        "Batch chunk failed"
                    );
                    metrics::record_batch_chunk(false);
                    return Err(BatchError {
                        chunk_index,
                        committed: report.operations() + failure.persisted,
                        discarded: failure.discarded,
                        pending: self.queue.len(),
                        source: failure.source,
                    });
                }
            }
        }

        tracing::info!(chunks = report.chunks.len(), operations = report.operations(), "Batch executed");
        Ok(report)
    }

    async fn run_transactional_chunk(&mut self) -> Result<usize, ChunkFailure<S::Error>> {
        // Nothing leaves the queue until a transaction is open.
        let mut tx = self.store.begin().await.map_err(|source| ChunkFailure {
            source,
            persisted: 0,
            discarded: 0,
        })?;

        let size = self.batch_size.min(self.queue.len());
        let chunk: Vec<_> = self.queue.drain(..size).collect();
        let rolled_back = |source| ChunkFailure {
            source,
            persisted: 0,
            discarded: size,
        };

        for operation in chunk {
            if let Err(e) = operation(Some(&mut tx)).await {
                if let Err(rollback) = self.store.rollback(tx).await {
                    tracing::error!(error = %rollback, "Failed to roll back batch transaction");
                }
                return Err(rolled_back(e));
            }
        }
        self.store.commit(tx).await.map_err(rolled_back)?;
        Ok(size)
    }

    async fn run_plain_chunk(&mut self) -> Result<usize, ChunkFailure<S::Error>> {
        let size = self.batch_size.min(self.queue.len());
        let mut chunk: VecDeque<_> = self.queue.drain(..size).collect();
        let mut persisted = 0;

        while let Some(operation) = chunk.pop_front() {
            if let Err(source) = operation(None).await {
                while let Some(untried) = chunk.pop_back() {
                    self.queue.push_front(untried);
                }
                return Err(ChunkFailure {
                    source,
                    persisted,
                    discarded: 1,
                });
            }
            persisted += 1;
        }
        Ok(size)
    }
}

impl<S: TransactionalStore> std::fmt::Debug for BatchProcessor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchProcessor")
            .field("batch_size", &self.batch_size)
            .field("pending", &self.queue.len())
            .finish()
    }
}
