//! Registry of circuit breakers keyed by dependency name.
//!
//! Breakers are created lazily on first reference and live for the lifetime
//! of the registry. The first caller to reference a name decides its options.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::CircuitBreakerConfig;
use crate::error::CircuitOpenError;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerOptions, CircuitBreakerStats};

/// Concurrent map of named breakers.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    defaults: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    /// Create an empty registry using built-in breaker defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry that resolves default options from config.
    pub fn with_config(defaults: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            defaults,
        }
    }

    /// Return the breaker for `name`, creating it with `options` if absent.
    ///
    /// `options` are ignored when the breaker already exists.
    pub fn get_or_create(&self, name: &str, options: CircuitBreakerOptions) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return existing.value().clone();
        }
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, options)))
            .value()
            .clone()
    }

    /// Return the breaker for `name`, creating it from configured settings.
    pub fn get_or_create_default(&self, name: &str) -> Arc<CircuitBreaker> {
        let options = self.defaults.settings_for(name).to_options();
        self.get_or_create(name, options)
    }

    /// Look up an existing breaker.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| b.value().clone())
    }

    /// Run `work` through the named breaker.
    pub async fn execute_with<F, Fut, T, E>(
        &self,
        name: &str,
        work: F,
        options: CircuitBreakerOptions,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CircuitOpenError>,
    {
        let breaker = self.get_or_create(name, options);
        breaker.execute(work).await
    }

    /// Reset every breaker to Closed.
    pub fn reset_all(&self) {
        let breakers: Vec<_> = self.breakers.iter().map(|b| b.value().clone()).collect();
        for breaker in breakers {
            breaker.reset();
        }
        tracing::info!(count = self.breakers.len(), "All circuit breakers reset");
    }

    /// Snapshots of all breakers, sorted by name.
    pub fn stats(&self) -> Vec<CircuitBreakerStats> {
        let mut stats: Vec<_> = self.breakers.iter().map(|b| b.value().stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Number of registered breakers.
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CircuitBreakerSettings;
    use crate::error::{OperationError, ResilienceError};
    use crate::resilience::circuit_breaker::CircuitState;
    use std::time::Duration;

    fn one_strike() -> CircuitBreakerOptions {
        CircuitBreakerOptions {
            failure_threshold: 1,
            ..CircuitBreakerOptions::default()
        }
    }

    #[test]
    fn test_first_writer_wins() {
        let registry = CircuitBreakerRegistry::new();
        let first = registry.get_or_create("db", one_strike());
        let second = registry.get_or_create("db", CircuitBreakerOptions::default());

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.options().failure_threshold, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_default_resolution_uses_overrides() {
        let mut config = CircuitBreakerConfig::default();
        config.overrides.insert(
            "ledger".into(),
            CircuitBreakerSettings {
                failure_threshold: 9,
                ..CircuitBreakerSettings::default()
            },
        );
        let registry = CircuitBreakerRegistry::with_config(config);

        assert_eq!(registry.get_or_create_default("ledger").options().failure_threshold, 9);
        assert_eq!(registry.get_or_create_default("search").options().failure_threshold, 5);
        assert_eq!(
            registry.get_or_create_default("search").options().open_duration,
            Duration::from_secs(60)
        );
    }

    #[tokio::test]
    async fn test_execute_with_and_reset_all() {
        let registry = CircuitBreakerRegistry::new();
        for name in ["db", "api"] {
            let result: Result<(), ResilienceError> = registry
                .execute_with(name, || async { Err(ResilienceError::from(OperationError::new("down"))) }, one_strike())
                .await;
            assert!(result.is_err());
        }

        let stats = registry.stats();
        assert_eq!(stats.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), vec!["api", "db"]);
        assert!(stats.iter().all(|s| s.state == CircuitState::Open));

        registry.reset_all();
        assert!(registry.stats().iter().all(|s| s.state == CircuitState::Closed));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creation_yields_one_breaker() {
        let registry = Arc::new(CircuitBreakerRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.get_or_create("shared", CircuitBreakerOptions::default())
            }));
        }
        let mut breakers = Vec::new();
        for handle in handles {
            breakers.push(handle.await.unwrap());
        }

        assert_eq!(registry.len(), 1);
        assert!(breakers.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
