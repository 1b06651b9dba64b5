use super::breaker::Breaker;
use super::listener::StateChangeListener;
use super::types::{BreakerConfig, BreakerMetrics, BreakerState};
use crate::config::BreakerSettings;
use crate::error::Result;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Independent breakers keyed by dependency name
#[derive(Clone)]
pub struct BreakerRegistry {
    /// Circuit breakers per dependency
    breakers: Arc<DashMap<String, Arc<Breaker>>>,
    /// Configuration for names without an override
    defaults: BreakerConfig,
    /// Per-dependency configuration
    overrides: Arc<HashMap<String, BreakerConfig>>,
    /// Listeners attached to every breaker this registry creates
    listeners: Vec<Arc<dyn StateChangeListener>>,
}

impl BreakerRegistry {
    /// Create a registry where every breaker uses `defaults`
    pub fn new(defaults: BreakerConfig) -> Result<Self> {
        defaults.validate()?;
        Ok(Self {
            breakers: Arc::new(DashMap::new()),
            defaults,
            overrides: Arc::new(HashMap::new()),
            listeners: Vec::new(),
        })
    }

    /// Create a registry from validated settings
    pub fn from_settings(settings: BreakerSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            breakers: Arc::new(DashMap::new()),
            defaults: settings.defaults,
            overrides: Arc::new(settings.breakers),
            listeners: Vec::new(),
        })
    }

    /// Attach a listener to every breaker created from now on
    pub fn with_listener(mut self, listener: Arc<dyn StateChangeListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Configuration a breaker for `name` is created with
    pub fn config_for(&self, name: &str) -> &BreakerConfig {
        self.overrides.get(name).unwrap_or(&self.defaults)
    }

    /// Get or create the breaker for a dependency
    pub fn get_or_create(&self, name: &str) -> Arc<Breaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(breaker = name, "Registering circuit breaker");
                let breaker = Breaker::new(name, self.config_for(name).clone());
                for listener in &self.listeners {
                    breaker.add_listener(listener.clone());
                }
                Arc::new(breaker)
            })
            .clone()
    }

    /// Get an existing breaker
    pub fn get(&self, name: &str) -> Option<Arc<Breaker>> {
        self.breakers.get(name).map(|entry| entry.value().clone())
    }

    /// State of a dependency's breaker; unknown dependencies are closed
    pub fn state(&self, name: &str) -> BreakerState {
        self.get(name)
            .map(|breaker| breaker.state())
            .unwrap_or(BreakerState::Closed)
    }

    /// Get all dependency names with breakers
    pub fn names(&self) -> Vec<String> {
        self.breakers.iter().map(|e| e.key().clone()).collect()
    }

    /// Snapshots of every registered breaker
    pub fn all_metrics(&self) -> Vec<BreakerMetrics> {
        let breakers: Vec<Arc<Breaker>> = self
            .breakers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        breakers.iter().map(|breaker| breaker.metrics()).collect()
    }
}

impl std::fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("breakers", &self.breakers.len())
            .field("defaults", &self.defaults)
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
