mod datastore;
pub mod factory;
mod json_store;
pub mod sqlite;
pub mod traits;

pub use datastore::Datastore;
pub use factory::{connect, convert, ConversionReport};
pub use json_store::JsonDatastore;
pub use sqlite::SqliteDatastore;
pub use traits::{RecordRepository, RecordScan};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::record::WorldId;

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Failed to initialize {store} datastore: {reason}")]
    Initialization { store: DatastoreType, reason: String },
    #[error("Read failed: {0}")]
    Read(String),
    #[error("Write failed: {0}")]
    Write(String),
    #[error("Conversion from {source_type} datastore failed: {reason}")]
    Conversion {
        source_type: DatastoreType,
        reason: String,
    },
    #[error("Schema migration failed: {0}")]
    SchemaMigration(String),
    #[error("Unsupported schema version {found} (this build supports up to {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },
    #[error("World {0} is not loaded")]
    UnknownWorld(WorldId),
    #[error("{0} datastore is not initialized")]
    NotInitialized(DatastoreType),
    #[error("{0} datastore is closed")]
    Closed(DatastoreType),
}

impl PersistenceError {
    pub(crate) fn initialization(store: DatastoreType, err: impl fmt::Display) -> Self {
        Self::Initialization {
            store,
            reason: err.to_string(),
        }
    }

    pub(crate) fn conversion(source_type: DatastoreType, err: impl fmt::Display) -> Self {
        Self::Conversion {
            source_type,
            reason: err.to_string(),
        }
    }
}

/// Backing store formats. Adding a backend means adding a variant here and
/// in [`Datastore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DatastoreType {
    /// Single nested JSON document, `deathlocations.json`.
    Json,
    /// Embedded SQLite database, `deathlocations.db`.
    Sqlite,
}

impl DatastoreType {
    pub const ALL: [DatastoreType; 2] = [DatastoreType::Json, DatastoreType::Sqlite];

    pub fn file_name(&self) -> &'static str {
        match self {
            DatastoreType::Json => "deathlocations.json",
            DatastoreType::Sqlite => "deathlocations.db",
        }
    }

    pub fn artifact_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(self.file_name())
    }
}

impl fmt::Display for DatastoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatastoreType::Json => write!(f, "JSON"),
            DatastoreType::Sqlite => write!(f, "SQLite"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown datastore type '{0}'")]
pub struct UnknownDatastoreType(String);

impl FromStr for DatastoreType {
    type Err = UnknownDatastoreType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sql" => Ok(DatastoreType::Sqlite),
            // "yaml" is what older configs call the flat-file store.
            "json" | "yaml" | "yml" | "file" => Ok(DatastoreType::Json),
            _ => Err(UnknownDatastoreType(s.to_string())),
        }
    }
}

impl TryFrom<String> for DatastoreType {
    type Error = UnknownDatastoreType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DatastoreType> for String {
    fn from(value: DatastoreType) -> Self {
        value.to_string()
    }
}
