//! Configuration file parsing
//!
//! Parses TOML configuration files for the blob server and opens the
//! configured partitions.

use crate::dispatch::DEFAULT_FANOUT_TIMEOUT;
use crate::engine::{EngineError, MemoryEngine, SledEngine};
use crate::router::{PartitionId, PartitionRegistry, PartitionStrategy};
use crate::store::{BlobStore, VersionedStore};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to open partition {partition}: {source}")]
    Open {
        partition: PartitionId,
        #[source]
        source: EngineError,
    },
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Routing settings
    #[serde(default)]
    pub router: RouterConfig,

    /// Partition definitions
    #[serde(default = "default_partitions")]
    pub partition: Vec<PartitionConfig>,
}

/// Server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Log level (trace, debug, info, warn, error, off)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Per-partition bound on a KEYS scan, in milliseconds
    #[serde(default = "default_fanout_timeout_ms")]
    pub fanout_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            log_level: default_log_level(),
            fanout_timeout_ms: default_fanout_timeout_ms(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8390".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_fanout_timeout_ms() -> u64 {
    DEFAULT_FANOUT_TIMEOUT.as_millis() as u64
}

/// Routing settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub strategy: StrategyType,
}

/// Routing strategy
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StrategyType {
    Single,
    #[default]
    Multi,
}

/// Partition configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PartitionConfig {
    /// Partition index
    pub id: PartitionId,

    /// Storage engine
    pub backend: BackendType,

    /// Database directory (sled only)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Storage engine type
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    Sled,
    Memory,
}

/// Two in-memory partitions
fn default_partitions() -> Vec<PartitionConfig> {
    (0..2)
        .map(|id| PartitionConfig {
            id,
            backend: BackendType::Memory,
            path: None,
        })
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            router: RouterConfig::default(),
            partition: default_partitions(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.partition.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one [[partition]] is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for partition in &self.partition {
            if !seen.insert(partition.id) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate partition {}",
                    partition.id
                )));
            }
            if partition.backend == BackendType::Sled && partition.path.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "sled backend requires a path for partition {}",
                    partition.id
                )));
            }
        }

        match self.router.strategy {
            StrategyType::Single => {
                if !seen.contains(&0) {
                    return Err(ConfigError::Invalid(
                        "single strategy requires partition 0".to_string(),
                    ));
                }
            }
            StrategyType::Multi => {
                // Keys hash modulo the partition count, so every residue needs a partition
                let count = self.partition.len() as PartitionId;
                if let Some(stray) = seen.iter().find(|id| **id >= count) {
                    return Err(ConfigError::Invalid(format!(
                        "multi strategy needs partitions numbered 0..{}, found {}",
                        count, stray
                    )));
                }
            }
        }

        if self.server.fanout_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "fanout_timeout_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Routing strategy implied by the configuration
    pub fn strategy(&self) -> PartitionStrategy {
        match self.router.strategy {
            StrategyType::Single => PartitionStrategy::Single,
            StrategyType::Multi => PartitionStrategy::Multi(self.partition.len() as u32),
        }
    }

    pub fn fanout_timeout(&self) -> Duration {
        Duration::from_millis(self.server.fanout_timeout_ms)
    }

    /// Open every configured partition and register it.
    ///
    /// Fails on the first engine that cannot be opened.
    pub fn open_partitions(&self) -> Result<PartitionRegistry, ConfigError> {
        let registry = PartitionRegistry::new(self.strategy());
        for partition in &self.partition {
            let store = partition.open()?;
            registry
                .add(partition.id, store)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(registry)
    }
}

impl PartitionConfig {
    /// Open this partition's engine and wrap it in a versioned store
    pub fn open(&self) -> Result<Arc<dyn BlobStore>, ConfigError> {
        let store: Arc<dyn BlobStore> = match (self.backend, &self.path) {
            (BackendType::Sled, Some(path)) => {
                log::info!("Opening partition {} (sled at {})", self.id, path.display());
                let engine = SledEngine::open(path).map_err(|source| ConfigError::Open {
                    partition: self.id,
                    source,
                })?;
                Arc::new(VersionedStore::new(self.id, engine))
            }
            (BackendType::Sled, None) => {
                return Err(ConfigError::Invalid(format!(
                    "sled backend requires a path for partition {}",
                    self.id
                )))
            }
            (BackendType::Memory, _) => {
                log::info!("Opening partition {} (memory)", self.id);
                Arc::new(VersionedStore::new(self.id, MemoryEngine::new()))
            }
        };
        Ok(store)
    }
}
