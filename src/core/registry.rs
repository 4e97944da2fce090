//! Owns one circuit breaker per protected dependency.
//!
//! Replaces process-wide singletons: construct a registry at startup and pass
//! it (or the breakers it hands out) to whoever needs them.

use crate::core::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::domain::model::CircuitSnapshot;
use crate::domain::ports::Clock;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

pub struct BreakerRegistry {
    clock: Arc<dyn Clock>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the breaker for `name`, creating it on first use.
    ///
    /// Creation happens at most once per name; `config` is ignored when the
    /// breaker already exists.
    pub fn get_or_create(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.get(name) {
            return existing;
        }

        let mut breakers = self.breakers.write().unwrap_or_else(PoisonError::into_inner);
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(breaker = %name, ?config, "Creating circuit breaker");
                Arc::new(CircuitBreaker::new(name, config, self.clock.clone()))
            })
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Snapshots of every breaker, sorted by name.
    pub fn snapshots(&self) -> Vec<CircuitSnapshot> {
        let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
        let mut snapshots: Vec<CircuitSnapshot> =
            breakers.values().map(|breaker| breaker.get_state()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
        for breaker in breakers.values() {
            breaker.reset();
        }
    }

    pub fn len(&self) -> usize {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::ManualClock;
    use crate::domain::model::CircuitState;

    fn registry() -> BreakerRegistry {
        BreakerRegistry::new(Arc::new(ManualClock::new()))
    }

    #[test]
    fn test_get_or_create_returns_same_instance() {
        let registry = registry();
        let a = registry.get_or_create("lyrics", CircuitBreakerConfig::default());
        let b = registry.get_or_create(
            "lyrics",
            CircuitBreakerConfig {
                failure_threshold: 99,
                ..Default::default()
            },
        );

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.config().failure_threshold, 5);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_breakers_are_isolated_per_dependency() {
        let registry = registry();
        let lyrics = registry.get_or_create("lyrics", CircuitBreakerConfig::default());
        let artwork = registry.get_or_create("artwork", CircuitBreakerConfig::default());

        assert!(!Arc::ptr_eq(&lyrics, &artwork));
        let names: Vec<String> = registry.snapshots().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["artwork".to_string(), "lyrics".to_string()]);
    }

    #[tokio::test]
    async fn test_reset_by_name() {
        let registry = registry();
        let breaker = registry.get_or_create(
            "lyrics",
            CircuitBreakerConfig {
                failure_threshold: 1,
                ..Default::default()
            },
        );

        let _ = breaker.call(|| async { Err::<(), _>("down") }).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        assert!(registry.reset("lyrics"));
        assert!(!registry.reset("missing"));
        assert_eq!(breaker.state(), CircuitState::Closed);

        let _ = breaker.call(|| async { Err::<(), _>("down") }).await;
        registry.reset_all();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_creates_once() {
        let registry = Arc::new(registry());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.get_or_create("lyrics", CircuitBreakerConfig::default())
            }));
        }

        let mut breakers = Vec::new();
        for handle in handles {
            breakers.push(handle.await.unwrap());
        }

        assert_eq!(registry.len(), 1);
        assert!(breakers.iter().all(|b| Arc::ptr_eq(b, &breakers[0])));
    }
}
