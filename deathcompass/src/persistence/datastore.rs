use std::path::Path;
use std::sync::Arc;

use super::{
    DatastoreType, JsonDatastore, PersistenceError, RecordRepository, RecordScan, SqliteDatastore,
};
use crate::config::StorageConfig;
use crate::record::{DeathRecord, PlayerId, WorldId};
use crate::worlds::WorldRegistry;

/// The closed set of datastore variants, selected by [`DatastoreType`].
pub enum Datastore {
    Json(JsonDatastore),
    Sqlite(SqliteDatastore),
}

macro_rules! dispatch {
    ($self:expr, $store:ident => $body:expr) => {
        match $self {
            Datastore::Json($store) => $body,
            Datastore::Sqlite($store) => $body,
        }
    };
}

impl Datastore {
    /// Build an uninitialized store of the given type rooted at `data_dir`.
    pub fn new(
        kind: DatastoreType,
        data_dir: &Path,
        worlds: Arc<dyn WorldRegistry>,
        write_queue_capacity: usize,
    ) -> Self {
        let path = kind.artifact_path(data_dir);
        match kind {
            DatastoreType::Json => Datastore::Json(JsonDatastore::new(path, worlds)),
            DatastoreType::Sqlite => {
                Datastore::Sqlite(SqliteDatastore::new(path, worlds, write_queue_capacity))
            }
        }
    }

    pub fn from_config(
        kind: DatastoreType,
        config: &StorageConfig,
        worlds: Arc<dyn WorldRegistry>,
    ) -> Self {
        Self::new(kind, &config.data_dir, worlds, config.write_queue_capacity)
    }
}

impl RecordRepository for Datastore {
    fn store_type(&self) -> DatastoreType {
        dispatch!(self, s => s.store_type())
    }

    fn is_initialized(&self) -> bool {
        dispatch!(self, s => s.is_initialized())
    }

    fn exists(&self) -> bool {
        dispatch!(self, s => s.exists())
    }

    async fn initialize(&mut self) -> Result<(), PersistenceError> {
        dispatch!(self, s => s.initialize().await)
    }

    async fn select_record(
        &self,
        player: PlayerId,
        world: WorldId,
    ) -> Result<Option<DeathRecord>, PersistenceError> {
        dispatch!(self, s => s.select_record(player, world).await)
    }

    async fn select_all_records(&self) -> Result<RecordScan, PersistenceError> {
        dispatch!(self, s => s.select_all_records().await)
    }

    async fn insert_record(&mut self, record: DeathRecord) -> Result<(), PersistenceError> {
        dispatch!(self, s => s.insert_record(record).await)
    }

    async fn insert_records(&mut self, records: Vec<DeathRecord>) -> Result<usize, PersistenceError> {
        dispatch!(self, s => s.insert_records(records).await)
    }

    async fn delete_record(
        &mut self,
        player: PlayerId,
        world: WorldId,
    ) -> Result<Option<DeathRecord>, PersistenceError> {
        dispatch!(self, s => s.delete_record(player, world).await)
    }

    async fn sync(&mut self) -> Result<(), PersistenceError> {
        dispatch!(self, s => s.sync().await)
    }

    async fn close(&mut self) -> Result<(), PersistenceError> {
        dispatch!(self, s => s.close().await)
    }

    async fn delete(&mut self) -> Result<bool, PersistenceError> {
        dispatch!(self, s => s.delete().await)
    }
}
