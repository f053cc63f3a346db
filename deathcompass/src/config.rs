//! Configuration for the death location store.
//!
//! Settings come from a JSON file whose fields all have defaults. The data
//! directory follows this precedence when the file does not set one:
//! 1. `DEATHCOMPASS_DATA_DIR` environment variable
//! 2. the platform config directory (`~/.config/deathcompass` on Linux)
//! 3. `./data` (fallback for development)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::persistence::DatastoreType;

const DATA_DIR_ENV: &str = "DEATHCOMPASS_DATA_DIR";
const APP_DIR_NAME: &str = "deathcompass";
const DEV_DATA_DIR: &str = "./data";

const DEFAULT_AUTOSAVE_INTERVAL_SECS: u64 = 300;
const DEFAULT_WRITE_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Which backing store to use, e.g. `"SQLite"` or `"JSON"`.
    pub datastore: DatastoreType,
    /// Log every cache hit, miss and write.
    pub debug: bool,
    pub data_dir: PathBuf,
    /// How often [`tick`](crate::DeathLocations::tick) flushes the store.
    pub autosave_interval_secs: u64,
    /// Upserts that may wait in the SQLite writer queue before submitters block.
    pub write_queue_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            datastore: DatastoreType::Sqlite,
            debug: false,
            data_dir: get_data_dir(),
            autosave_interval_secs: DEFAULT_AUTOSAVE_INTERVAL_SECS,
            write_queue_capacity: DEFAULT_WRITE_QUEUE_CAPACITY,
        }
    }
}

impl StorageConfig {
    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs)
    }

    pub fn artifact_path(&self, kind: DatastoreType) -> PathBuf {
        kind.artifact_path(&self.data_dir)
    }
}

/// Get the data directory for persistence.
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(dirs) = directories::BaseDirs::new() {
        return dirs.config_dir().join(APP_DIR_NAME);
    }

    PathBuf::from(DEV_DATA_DIR)
}
