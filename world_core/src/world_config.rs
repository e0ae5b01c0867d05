//! Runtime configuration for a world instance.
//!
//! Loaded from `world_config.json` with support for an environment variable
//! override.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    directory::IndexCallPolicy,
    mapgen::{MapGenConfig, MapGenError},
    projection::{ProjectionError, ProjectionSettings},
};

pub const BUILTIN_WORLD_CONFIG: &str = include_str!("data/world_config.json");

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub map: MapConfig,
    pub projection: ProjectionSettings,
    pub index_calls: IndexCallConfig,
    pub events: EventConfig,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub width: u32,
    pub height: u32,
    pub territory_count: u32,
    pub seed: Option<u64>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 1000,
            territory_count: 50,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct IndexCallConfig {
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for IndexCallConfig {
    fn default() -> Self {
        let policy = IndexCallPolicy::default();
        Self {
            timeout_ms: policy.timeout.as_millis() as u64,
            max_attempts: policy.max_attempts,
            backoff_ms: policy.backoff.as_millis() as u64,
        }
    }
}

/// Subscriber queue settings. A missing capacity means unbounded queues.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    pub channel_capacity: Option<usize>,
}

#[derive(Debug, Error)]
pub enum WorldConfigError {
    #[error("failed to parse world config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read world config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid map section: {0}")]
    InvalidMap(#[source] MapGenError),
    #[error("invalid projection section: {0}")]
    InvalidProjection(#[from] ProjectionError),
    #[error("index_calls.max_attempts must be at least 1")]
    NoAttempts,
    #[error("events.channel_capacity must be at least 1 when set")]
    ZeroCapacity,
}

impl WorldConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            WorldConfig::from_json_str(BUILTIN_WORLD_CONFIG)
                .expect("builtin world config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, WorldConfigError> {
        let config: WorldConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, WorldConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| WorldConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        WorldConfig::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), WorldConfigError> {
        self.map_gen_config()
            .validate()
            .map_err(WorldConfigError::InvalidMap)?;
        self.projection.validate()?;
        if self.index_calls.max_attempts == 0 {
            return Err(WorldConfigError::NoAttempts);
        }
        if self.events.channel_capacity == Some(0) {
            return Err(WorldConfigError::ZeroCapacity);
        }
        Ok(())
    }

    pub fn map_gen_config(&self) -> MapGenConfig {
        MapGenConfig {
            width: self.map.width,
            height: self.map.height,
            territory_count: self.map.territory_count,
            seed: self.map.seed,
        }
    }

    pub fn index_call_policy(&self) -> IndexCallPolicy {
        IndexCallPolicy {
            timeout: Duration::from_millis(self.index_calls.timeout_ms),
            max_attempts: self.index_calls.max_attempts,
            backoff: Duration::from_millis(self.index_calls.backoff_ms),
        }
    }
}

/// Where the active world configuration came from.
#[derive(Debug, Clone, Default)]
pub struct WorldConfigMetadata {
    path: Option<PathBuf>,
}

impl WorldConfigMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// `None` when the builtin copy is in use.
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

/// Load world configuration from `WORLD_CONFIG_PATH` or the default path.
pub fn load_world_config_from_env() -> (Arc<WorldConfig>, WorldConfigMetadata) {
    let path = env::var("WORLD_CONFIG_PATH")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/data/world_config.json")
        });

    match WorldConfig::from_file(&path) {
        Ok(config) => {
            tracing::info!(
                target: "world::config",
                path = %path.display(),
                "world_config.loaded=file"
            );
            return (Arc::new(config), WorldConfigMetadata::new(Some(path)));
        }
        Err(err) => {
            tracing::warn!(
                target: "world::config",
                path = %path.display(),
                error = %err,
                "world_config.load_failed"
            );
        }
    }

    let config = WorldConfig::builtin();
    tracing::info!(target: "world::config", "world_config.loaded=builtin");
    (config, WorldConfigMetadata::new(None))
}
