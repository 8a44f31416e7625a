//! Runtime configuration for viewport-cache.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! All cache knobs (working-set cap, key precision, invalidation thresholds,
//! debounce/timeout) live here.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Working-set capacity settings.
    pub cache: CacheConfig,

    /// Cache-key and invalidation-heuristic tuning.
    pub keyer: KeyerConfig,

    /// Debounce and request-timeout settings.
    pub fetch: FetchConfig,
}

/// Errors detected when validating a configuration at engine construction.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("max_entities must be greater than zero")]
    InvalidMaxEntities,

    #[error("coordinate_precision must be between 0 and 9, got {0}")]
    InvalidPrecision(i32),
}

/// Working-set capacity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of features held in the working set.
    pub max_entities: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_entities: 5000 }
    }
}

/// Cache-key rounding precision and invalidation thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyerConfig {
    /// Decimal places kept when quantizing extent coordinates into a key.
    /// Coarse enough that pixel-level pan jitter maps to the same key.
    pub coordinate_precision: i32,

    /// Longitude span (degrees) above which a viewport counts as world-wide.
    pub world_lon_span_deg: f64,

    /// Latitude span (degrees) above which a viewport counts as world-wide.
    pub world_lat_span_deg: f64,

    /// Zoom at or below which a viewport counts as world-wide.
    pub low_zoom_threshold: f64,

    /// Zoom delta at or above which previously cached keys are presumed stale.
    pub zoom_jump_threshold: f64,
}

impl Default for KeyerConfig {
    fn default() -> Self {
        Self {
            coordinate_precision: 2,
            world_lon_span_deg: 300.0,
            world_lat_span_deg: 150.0,
            low_zoom_threshold: 2.0,
            zoom_jump_threshold: 3.0,
        }
    }
}

/// Debounce and request-timeout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Delay after the last view-change event before a fetch is issued.
    pub debounce_ms: u64,

    /// Upper bound on a single bounding-box request; a hung data source
    /// would otherwise leave the engine loading indefinitely.
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            timeout_secs: 30,
        }
    }
}

impl FetchConfig {
    /// Debounce delay as a [`Duration`].
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults if the
    /// file does not exist.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let config = if path.exists() {
            let data = std::fs::read_to_string(path)?;
            serde_json::from_str(&data)?
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    ///
    /// Called at engine construction: a bad cap is a fatal setup error,
    /// never a runtime one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.max_entities == 0 {
            return Err(ConfigError::InvalidMaxEntities);
        }
        if !(0..=9).contains(&self.keyer.coordinate_precision) {
            return Err(ConfigError::InvalidPrecision(
                self.keyer.coordinate_precision,
            ));
        }
        Ok(())
    }
}
