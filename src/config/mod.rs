use crate::circuit_breaker::BreakerConfig;
use crate::error::{BreakerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Breaker settings for a whole application
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BreakerSettings {
    /// Configuration for dependencies without their own entry
    #[serde(default)]
    pub defaults: BreakerConfig,
    /// Per-dependency configuration; missing fields take the built-in defaults
    #[serde(default)]
    pub breakers: HashMap<String, BreakerConfig>,
}

impl BreakerSettings {
    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BreakerError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse settings from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| BreakerError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Serialize settings back to YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| BreakerError::Serialization(e.to_string()))
    }

    /// Validate the defaults and every per-dependency entry
    pub fn validate(&self) -> Result<()> {
        self.defaults
            .validate()
            .map_err(|e| BreakerError::Config(format!("defaults: {}", e)))?;

        for (name, config) in &self.breakers {
            if name.is_empty() {
                return Err(BreakerError::Config(
                    "Breaker name cannot be empty".to_string(),
                ));
            }

            config
                .validate()
                .map_err(|e| BreakerError::Config(format!("breaker '{}': {}", name, e)))?;
        }

        Ok(())
    }
}
