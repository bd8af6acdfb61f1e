//! Idempotency cache.
//!
//! # Responsibilities
//! - Memoize the successful result of an operation under a caller key
//! - Serialize concurrent first calls for the same key
//! - Expire records after a TTL, sweeping opportunistically on `execute`
//!
//! # Design Decisions
//! - Each key maps to a shared in-flight cell, not just a completed value:
//!   the second concurrent caller awaits the first caller's result
//! - Failures are not memoized; the cell stays empty and the next caller runs
//! - No background timer; sweeping piggybacks on `execute`, throttled

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::OnceCell;
use tokio::time::Instant;

use crate::config::IdempotencyConfig;
use crate::observability::metrics;

/// A memoized result.
#[derive(Debug, Clone)]
pub struct IdempotencyRecord<T> {
    pub value: T,
    pub recorded_at: Instant,
}

impl<T> IdempotencyRecord<T> {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.recorded_at.elapsed() >= ttl
    }
}

type Slot<T> = Arc<OnceCell<IdempotencyRecord<T>>>;

/// Key → result memo shared by every caller of the application.
#[derive(Debug)]
pub struct IdempotencyCache<T> {
    entries: DashMap<String, Slot<T>>,
    ttl: Duration,
    sweep_interval: Duration,
    last_sweep: Mutex<Instant>,
}

impl<T: Clone> IdempotencyCache<T> {
    pub fn new(ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            sweep_interval,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    pub fn from_config(config: &IdempotencyConfig) -> Self {
        Self::new(
            Duration::from_secs(config.ttl_secs),
            Duration::from_secs(config.sweep_interval_secs),
        )
    }

    /// Return the memoized value for `key`, or run `operation` and memoize it.
    pub async fn execute<F, Fut, E>(&self, key: &str, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.maybe_sweep();

        let slot = self.slot(key);
        let executed = AtomicBool::new(false);
        let result = slot
            .get_or_try_init(|| async {
                executed.store(true, Ordering::Relaxed);
                let value = operation().await?;
                Ok::<_, E>(IdempotencyRecord {
                    value,
                    recorded_at: Instant::now(),
                })
            })
            .await;

        match result {
            Ok(record) => {
                if executed.load(Ordering::Relaxed) {
                    tracing::debug!(key, "Idempotent operation executed and recorded");
                    metrics::record_idempotency_entries(self.entries.len());
                } else {
                    tracing::debug!(key, "Returning recorded result for idempotency key");
                    metrics::record_idempotency_hit();
                }
                Ok(record.value.clone())
            }
            Err(e) => {
                self.entries.remove_if(key, |_, current| {
                    Arc::ptr_eq(current, &slot) && !current.initialized() && Arc::strong_count(current) == 2
                });
                Err(e)
            }
        }
    }

    /// Unexpired value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<T> {
        let slot = self.entries.get(key)?;
        slot.get()
            .filter(|record| !record.is_expired(self.ttl))
            .map(|record| record.value.clone())
    }

    /// Forget the record for `key`.
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop expired records and abandoned empty slots. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, slot| match slot.get() {
            Some(record) => !record.is_expired(ttl),
            None => Arc::strong_count(slot) > 1,
        });
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.entries.len(), "Swept expired idempotency records");
        }
        metrics::record_idempotency_entries(self.entries.len());
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn slot(&self, key: &str) -> Slot<T> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let expired = occupied.get().get().is_some_and(|r| r.is_expired(self.ttl));
                if expired {
                    occupied.insert(Arc::new(OnceCell::new()));
                }
                occupied.get().clone()
            }
            Entry::Vacant(vacant) => vacant.insert(Arc::new(OnceCell::new())).value().clone(),
        }
    }

    fn maybe_sweep(&self) {
        let now = Instant::now();
        {
            let mut last = self.last_sweep.lock().unwrap_or_else(PoisonError::into_inner);
            if now.duration_since(*last) < self.sweep_interval {
                return;
            }
            *last = now;
        }
        self.sweep();
    }
}
