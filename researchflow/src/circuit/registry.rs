//! Registry owning one circuit breaker per collaborator name.

use super::{BreakerConfig, BreakerSnapshot, CircuitBreaker, CircuitState, Clock, SystemClock};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Lazily creates and owns exactly one [`CircuitBreaker`] per collaborator.
///
/// Construct it once and share it (`Arc<BreakerRegistry>`) with every
/// orchestrator that should see the same failure history.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    defaults: BreakerConfig,
    clock: Arc<dyn Clock>,
}

impl BreakerRegistry {
    /// Creates a registry with default breaker settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BreakerConfig::default())
    }

    /// Creates a registry whose breakers use `defaults`.
    #[must_use]
    pub fn with_config(defaults: BreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            defaults,
            clock: Arc::new(SystemClock),
        }
    }

    /// Sets the time source handed to newly created breakers.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the breaker for `name`, creating it on first use.
    pub fn get_breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return existing.clone();
        }
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                info!(breaker = %name, "Creating circuit breaker");
                Arc::new(CircuitBreaker::with_clock(name, self.defaults, self.clock.clone()))
            })
            .clone()
    }

    /// Returns a name → state snapshot, sorted by name.
    #[must_use]
    pub fn get_status(&self) -> BTreeMap<String, CircuitState> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state()))
            .collect()
    }

    /// Returns detailed snapshots, sorted by name.
    #[must_use]
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<_> = self.breakers.iter().map(|entry| entry.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Resets every managed breaker to Closed.
    pub fn reset_all(&self) {
        for entry in &self.breakers {
            entry.value().reset();
        }
        info!(count = self.breakers.len(), "Reset all circuit breakers");
    }

    /// Returns the number of managed breakers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Returns true if no breaker has been created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Returns the defaults applied to new breakers.
    #[must_use]
    pub fn defaults(&self) -> BreakerConfig {
        self.defaults
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
