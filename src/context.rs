//! Composition root for the resilience layer.
//!
//! # Responsibilities
//! - Build the shared breaker registry and idempotency cache from config
//! - Hand out per-dependency executors and per-use primitives
//! - Produce snapshots for periodic logging
//!
//! # Design Decisions
//! - One context per application; nothing here is a process global
//! - Shared state lives behind `Arc`, so the context is cheap to clone

use std::sync::Arc;

use serde::Serialize;

use crate::config::ResilienceConfig;
use crate::resilience::{
    CircuitBreakerRegistry, CircuitBreakerStats, CircuitState, ResilientExecutor, RetryExecutor, RetryPolicy,
};
use crate::transactions::{BatchProcessor, IdempotencyCache, OptimisticLock, Saga, TransactionalStore};

/// Point-in-time view of the shared resilience state.
#[derive(Debug, Clone, Serialize)]
pub struct ResilienceSnapshot {
    pub breakers: Vec<CircuitBreakerStats>,
    pub open_breakers: usize,
    pub idempotency_entries: usize,
}

/// Shared resilience state and factories.
#[derive(Debug, Clone)]
pub struct ResilienceContext {
    config: Arc<ResilienceConfig>,
    breakers: Arc<CircuitBreakerRegistry>,
    retry_policy: RetryPolicy,
    idempotency: Arc<IdempotencyCache<serde_json::Value>>,
    optimistic_lock: OptimisticLock,
}

impl ResilienceContext {
    pub fn new(config: ResilienceConfig) -> Self {
        let breakers = Arc::new(CircuitBreakerRegistry::with_config(config.circuit_breaker.clone()));
        let retry_policy = config.retry.to_policy();
        let idempotency = Arc::new(IdempotencyCache::from_config(&config.idempotency));
        let optimistic_lock = OptimisticLock::from_config(&config.optimistic_lock);

        Self {
            config: Arc::new(config),
            breakers,
            retry_policy,
            idempotency,
            optimistic_lock,
        }
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Breaker-gated retry executor for the named dependency.
    pub fn executor(&self, dependency: &str) -> ResilientExecutor {
        let breaker = self.breakers.get_or_create_default(dependency);
        ResilientExecutor::new(breaker, self.retry_policy.clone())
    }

    /// Retry executor without a breaker.
    pub fn retry(&self) -> RetryExecutor {
        RetryExecutor::new(self.retry_policy.clone())
    }

    pub fn idempotency(&self) -> &Arc<IdempotencyCache<serde_json::Value>> {
        &self.idempotency
    }

    pub fn optimistic_lock(&self) -> &OptimisticLock {
        &self.optimistic_lock
    }

    /// Empty batch processor using the configured chunk size.
    pub fn batch_processor<S: TransactionalStore>(&self, store: Arc<S>) -> BatchProcessor<S> {
        BatchProcessor::from_config(store, &self.config.batch)
    }

    /// Empty saga with the given name.
    pub fn saga<T, E>(&self, name: &str) -> Saga<T, E>
    where
        T: Send + 'static,
        E: std::error::Error + Send + 'static,
    {
        Saga::new(name)
    }

    pub fn snapshot(&self) -> ResilienceSnapshot {
        let breakers = self.breakers.stats();
        let open_breakers = breakers.iter().filter(|s| s.state == CircuitState::Open).count();
        ResilienceSnapshot {
            breakers,
            open_breakers,
            idempotency_entries: self.idempotency.len(),
        }
    }
}
