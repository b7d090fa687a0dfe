//! Engine configuration
//!
//! One [`EngineConfig`] drives test generation, property verification and
//! execution. It deserializes with defaults for every missing field, so an
//! external CLI layer can hand over a partial JSON document. Configuration
//! errors are the only fatal errors in the engine and are raised before any
//! work starts.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::DEFAULT_BOUNDARY_DEPTH;

/// Pairwise interaction coverage
pub const DEFAULT_STRENGTH: usize = 2;

/// Default number of random bindings drawn per property
pub const DEFAULT_PROPERTY_SAMPLES: usize = 100;

/// Default cap on shrink rounds per counter-example
pub const DEFAULT_SHRINK_ROUND_LIMIT: usize = 1000;

/// Default worker pool size
pub const DEFAULT_WORKERS: usize = 4;

/// Result type for configuration validation
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("strength must be at least 1, got {0}")]
    InvalidStrength(usize),

    #[error("boundary_depth must be at least 1, got {0}")]
    InvalidBoundaryDepth(usize),

    #[error("workers must be at least 1")]
    NoWorkers,

    #[error("shrink_round_limit must be at least 1")]
    ZeroShrinkRoundLimit,
}

/// Configuration for generation, verification and execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interaction strength of the covering array (2 = pairwise)
    pub strength: usize,

    /// Nested composite levels expanded during boundary generation
    pub boundary_depth: usize,

    /// Random test cases appended after the covering array
    pub sample_count: usize,

    /// Random bindings drawn per property
    pub property_samples: usize,

    /// Seed for every random stream in a run
    pub seed: u64,

    /// Maximum shrink rounds before a counter-example is reported as
    /// bound-exhausted
    pub shrink_round_limit: usize,

    /// Size of the execution worker pool
    pub workers: usize,

    /// Run-wide deadline in milliseconds; work not started by then is skipped
    pub deadline_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strength: DEFAULT_STRENGTH,
            boundary_depth: DEFAULT_BOUNDARY_DEPTH,
            sample_count: 0,
            property_samples: DEFAULT_PROPERTY_SAMPLES,
            seed: 0,
            shrink_round_limit: DEFAULT_SHRINK_ROUND_LIMIT,
            workers: DEFAULT_WORKERS,
            deadline_ms: None,
        }
    }
}

impl EngineConfig {
    /// Fail fast on values that make a run meaningless.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.strength < 1 {
            return Err(ConfigError::InvalidStrength(self.strength));
        }
        if self.boundary_depth < 1 {
            return Err(ConfigError::InvalidBoundaryDepth(self.boundary_depth));
        }
        if self.workers < 1 {
            return Err(ConfigError::NoWorkers);
        }
        if self.shrink_round_limit < 1 {
            return Err(ConfigError::ZeroShrinkRoundLimit);
        }
        Ok(())
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.strength, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        let config = EngineConfig { strength: 0, ..EngineConfig::default() };
        assert_eq!(config.validate(), Err(ConfigError::InvalidStrength(0)));

        let config = EngineConfig { boundary_depth: 0, ..EngineConfig::default() };
        assert_eq!(config.validate(), Err(ConfigError::InvalidBoundaryDepth(0)));

        let config = EngineConfig { workers: 0, ..EngineConfig::default() };
        assert_eq!(config.validate(), Err(ConfigError::NoWorkers));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"strength": 3, "deadline_ms": 250}"#).unwrap();
        assert_eq!(config.strength, 3);
        assert_eq!(config.property_samples, DEFAULT_PROPERTY_SAMPLES);
        assert_eq!(config.deadline(), Some(Duration::from_millis(250)));
    }
}
