//! Named circuit breakers, one per dependency
//!
//! Call sites that talk to the same dependency should trip the same breaker.
//! The registry creates a breaker the first time a name is seen and hands
//! out shared handles afterwards.

use super::circuit_breaker::CircuitBreaker;
use super::clock::{SharedClock, SystemClock};
use crate::config::CircuitBreakerConfig;
use crate::core::{CircuitStats, ConfigError};
use crate::monitoring::{SharedLogger, SharedNotifier, SharedObserver, TracingLogger};
use dashmap::DashMap;
use std::collections::BTreeMap;
use tracing::debug;

/// Concurrent map of breakers keyed by dependency name
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, CircuitBreaker>,
    config: CircuitBreakerConfig,
    clock: SharedClock,
    observer: Option<SharedObserver>,
    logger: SharedLogger,
    notifier: Option<SharedNotifier>,
}

impl CircuitBreakerRegistry {
    /// Registry whose breakers all use `config`
    pub fn new(config: CircuitBreakerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            breakers: DashMap::new(),
            config,
            clock: SystemClock::shared(),
            observer: None,
            logger: TracingLogger::shared(),
            notifier: None,
        })
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_notifier(mut self, notifier: SharedNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Breaker for `name`, created on first use
    pub fn get_or_create(&self, name: &str) -> CircuitBreaker {
        if let Some(existing) = self.breakers.get(name) {
            return existing.value().clone();
        }

        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(breaker = name, "creating circuit breaker");
                self.create(name)
            })
            .value()
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<CircuitBreaker> {
        self.breakers.get(name).map(|entry| entry.value().clone())
    }

    /// Drop the registry's handle; existing clones keep working
    pub fn remove(&self, name: &str) -> Option<CircuitBreaker> {
        self.breakers.remove(name).map(|(_, breaker)| breaker)
    }

    /// Force every breaker Closed
    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }

    /// Stats of every breaker, sorted by name
    pub fn snapshot(&self) -> BTreeMap<String, CircuitStats> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    fn create(&self, name: &str) -> CircuitBreaker {
        let mut builder = CircuitBreaker::builder(name, self.config.clone())
            .clock(self.clock.clone())
            .logger(self.logger.clone());
        if let Some(observer) = &self.observer {
            builder = builder.observer(observer.clone());
        }
        if let Some(notifier) = &self.notifier {
            builder = builder.notifier(notifier.clone());
        }
        builder.assemble()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CircuitState;

    #[test]
    fn test_get_or_create_shares_breakers() {
        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig::default()).unwrap();
        let first = registry.get_or_create("payments");
        let second = registry.get_or_create("payments");
        let other = registry.get_or_create("search");

        first.force_open();
        assert_eq!(second.state(), CircuitState::Open);
        assert_eq!(other.state(), CircuitState::Closed);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_reset_all_and_snapshot() {
        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig::default()).unwrap();
        registry.get_or_create("b").force_open();
        registry.get_or_create("a").force_open();

        registry.reset_all();
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(snapshot
            .values()
            .all(|stats| stats.state == CircuitState::Closed));
    }

    #[test]
    fn test_remove() {
        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig::default()).unwrap();
        assert!(registry.get("missing").is_none());
        registry.get_or_create("cache");
        assert!(registry.remove("cache").is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_invalid_config() {
        let config = CircuitBreakerConfig {
            half_open_max_attempts: 0,
            ..Default::default()
        };
        assert!(CircuitBreakerRegistry::new(config).is_err());
    }
}
