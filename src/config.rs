//! Configuration for packetkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, StoreError};

/// Main configuration for a sharded [`DataStore`](crate::DataStore)
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Base directory for shard files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── 0.db
    ///     ├── 1.db
    ///     └── ...      (one packet file per shard)
    pub data_dir: PathBuf,

    /// Number of shards (one chunk + one drive file each)
    pub chunk_count: usize,

    // -------------------------------------------------------------------------
    // Cache Configuration
    // -------------------------------------------------------------------------
    /// Per-chunk cache tier bounds
    pub cache: CacheLimits,
}

/// Bounds for the two in-memory tiers of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    /// Entries kept in the alive tier before the oldest is demoted
    pub alive_threshold: usize,

    /// Staged entries in the deadly tier before write-back is signalled
    pub deadly_threshold: usize,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            alive_threshold: 64,
            deadly_threshold: 32,
        }
    }
}

impl CacheLimits {
    pub fn validate(&self) -> Result<()> {
        if self.alive_threshold == 0 {
            return Err(StoreError::Configuration(
                "alive_threshold must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./packetkv_data"),
            chunk_count: 8,
            cache: CacheLimits::default(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.chunk_count == 0 {
            return Err(StoreError::Configuration(
                "chunk_count must be > 0".to_string(),
            ));
        }
        self.cache.validate()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the base directory for shard files
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the number of shards
    pub fn chunk_count(mut self, count: usize) -> Self {
        self.config.chunk_count = count;
        self
    }

    /// Set the alive tier bound
    pub fn alive_threshold(mut self, count: usize) -> Self {
        self.config.cache.alive_threshold = count;
        self
    }

    /// Set the deadly tier bound
    pub fn deadly_threshold(mut self, count: usize) -> Self {
        self.config.cache.deadly_threshold = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
