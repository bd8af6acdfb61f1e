//! Optimistic-concurrency retry for read-modify-write cycles.
//!
//! The caller supplies a read of the current record and a version-checked
//! update. Version conflicts trigger a fresh read after a linearly growing
//! sleep; every other error is returned as-is on the first occurrence.

use std::future::Future;
use std::time::Duration;

use crate::config::OptimisticLockConfig;
use crate::error::{Classify, ConcurrentModificationError, NotFoundError, VersionConflictError};

/// Records carrying a monotonically increasing version.
pub trait Versioned {
    fn version(&self) -> u64;
}

/// Check that `current` is still at `expected`.
///
/// Store adapters call this inside their update before writing.
pub fn ensure_version<V: Versioned>(current: &V, expected: u64) -> Result<(), VersionConflictError> {
    let actual = current.version();
    if actual == expected {
        Ok(())
    } else {
        Err(VersionConflictError { expected, actual })
    }
}

/// Retry bound and sleep unit for optimistic updates.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticLock {
    max_retries: u32,
    base_delay: Duration,
}

impl Default for OptimisticLock {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(50))
    }
}

impl OptimisticLock {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &OptimisticLockConfig) -> Self {
        Self::new(config.max_retries, Duration::from_millis(config.base_delay_ms))
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Read `entity`, apply the update, and re-read on version conflict.
    ///
    /// Fails with `NotFoundError` when the read yields nothing and with
    /// `ConcurrentModificationError` once every cycle has conflicted.
    pub async fn execute<R, RFut, A, AFut, C, T, E>(
        &self,
        entity: &str,
        mut read_current: R,
        mut apply_update: A,
    ) -> Result<T, E>
    where
        R: FnMut() -> RFut,
        RFut: Future<Output = Result<Option<C>, E>>,
        A: FnMut(C) -> AFut,
        AFut: Future<Output = Result<T, E>>,
        E: Classify + From<NotFoundError> + From<ConcurrentModificationError>,
    {
        for attempt in 1..=self.max_retries {
            let current = read_current()
                .await?
                .ok_or_else(|| NotFoundError(entity.to_string()))?;

            match apply_update(current).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_version_conflict() => {
                    tracing::debug!(entity, attempt, error = %e, "Version conflict, re-reading record");
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.base_delay * attempt).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        tracing::warn!(entity, attempts = self.max_retries, "Optimistic update kept conflicting");
        Err(E::from(ConcurrentModificationError {
            attempts: self.max_retries,
        }))
    }
}
