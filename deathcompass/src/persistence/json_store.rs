//! Flat-file datastore: one JSON document mirrored in memory.
//!
//! On disk the document is nested (player → world → location) so it stays
//! readable by hand; in memory it is a flat map keyed by [`RecordKey`].
//! Mutations only touch memory. [`sync`](RecordRepository::sync) and
//! [`close`](RecordRepository::close) write the document back.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use super::{DatastoreType, PersistenceError, RecordRepository, RecordScan};
use crate::record::{DeathRecord, PlayerId, RecordKey, WorldId};
use crate::worlds::WorldRegistry;

/// Leaf of the on-disk document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct StoredLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    world: Option<String>,
    x: f64,
    y: f64,
    z: f64,
    /// Written by old releases, read and discarded.
    #[serde(default, skip_serializing, rename = "timestamp")]
    _timestamp: Option<u64>,
}

type Document = BTreeMap<String, BTreeMap<String, StoredLocation>>;

pub struct JsonDatastore {
    path: PathBuf,
    worlds: Arc<dyn WorldRegistry>,
    records: HashMap<RecordKey, DeathRecord>,
    initialized: bool,
    dirty: bool,
}

impl JsonDatastore {
    pub fn new(path: PathBuf, worlds: Arc<dyn WorldRegistry>) -> Self {
        Self {
            path,
            worlds,
            records: HashMap::new(),
            initialized: false,
            dirty: false,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn ensure_initialized(&self) -> Result<(), PersistenceError> {
        if self.initialized {
            Ok(())
        } else {
            Err(PersistenceError::NotInitialized(DatastoreType::Json))
        }
    }

    /// Read the document from disk. The flag is set when some entry was
    /// keyed by world name and must be rewritten under the world id.
    fn load(&self) -> Result<(HashMap<RecordKey, DeathRecord>, bool), PersistenceError> {
        let contents = std::fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok((HashMap::new(), false));
        }
        let document: Document = serde_json::from_str(&contents)?;

        let mut records = HashMap::new();
        let mut renamed = false;
        for (player_key, worlds) in document {
            let Ok(player) = player_key.parse::<PlayerId>() else {
                tracing::warn!(path = %self.path.display(), key = %player_key, "Skipping entry with invalid player id");
                continue;
            };
            for (world_key, loc) in worlds {
                let world = match world_key.parse::<WorldId>() {
                    Ok(world) => world,
                    Err(_) => match self.worlds.world_id(&world_key) {
                        Some(world) => {
                            renamed = true;
                            world
                        }
                        None => {
                            tracing::warn!(%player, key = %world_key, "Skipping entry with unknown world");
                            continue;
                        }
                    },
                };
                let record = DeathRecord::new(player, world, loc.x, loc.y, loc.z);
                records.insert(record.key(), record);
            }
        }
        Ok((records, renamed))
    }

    fn to_document(&self) -> Document {
        let mut document = Document::new();
        for record in self.records.values() {
            document
                .entry(record.player.to_string())
                .or_default()
                .insert(
                    record.world.to_string(),
                    StoredLocation {
                        world: self.worlds.world_name(&record.world),
                        x: record.x,
                        y: record.y,
                        z: record.z,
                        _timestamp: None,
                    },
                );
        }
        document
    }

    fn write_document(&self) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.to_document())?;
        // An interrupted write leaves the previous document in place.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl RecordRepository for JsonDatastore {
    fn store_type(&self) -> DatastoreType {
        DatastoreType::Json
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }

    async fn initialize(&mut self) -> Result<(), PersistenceError> {
        if self.initialized {
            return Ok(());
        }

        let renamed = if self.path.exists() {
            let (records, renamed) = self
                .load()
                .map_err(|e| PersistenceError::initialization(DatastoreType::Json, e))?;
            self.records = records;
            renamed
        } else {
            self.records.clear();
            self.write_document()
                .map_err(|e| PersistenceError::initialization(DatastoreType::Json, e))?;
            false
        };

        self.initialized = true;
        self.dirty = renamed;
        tracing::info!(path = %self.path.display(), count = self.records.len(), "JSON datastore loaded");
        Ok(())
    }

    async fn select_record(
        &self,
        player: PlayerId,
        world: WorldId,
    ) -> Result<Option<DeathRecord>, PersistenceError> {
        self.ensure_initialized()?;
        Ok(self.records.get(&RecordKey::new(player, world)).copied())
    }

    async fn select_all_records(&self) -> Result<RecordScan, PersistenceError> {
        self.ensure_initialized()?;
        let mut scan = RecordScan::default();
        for record in self.records.values() {
            if self.worlds.world_name(&record.world).is_none() {
                tracing::warn!(player = %record.player, world = %record.world, "Skipping record in unknown world");
                scan.skipped += 1;
                continue;
            }
            scan.records.push(*record);
        }
        Ok(scan)
    }

    async fn insert_record(&mut self, record: DeathRecord) -> Result<(), PersistenceError> {
        self.ensure_initialized()?;
        if self.worlds.world_name(&record.world).is_none() {
            return Err(PersistenceError::UnknownWorld(record.world));
        }
        self.records.insert(record.key(), record);
        self.dirty = true;
        Ok(())
    }

    async fn insert_records(&mut self, records: Vec<DeathRecord>) -> Result<usize, PersistenceError> {
        self.ensure_initialized()?;
        let mut inserted = 0;
        for record in records {
            if self.worlds.world_name(&record.world).is_none() {
                tracing::warn!(player = %record.player, world = %record.world, "Not inserting record in unknown world");
                continue;
            }
            self.records.insert(record.key(), record);
            inserted += 1;
        }
        if inserted > 0 {
            self.dirty = true;
        }
        Ok(inserted)
    }

    async fn delete_record(
        &mut self,
        player: PlayerId,
        world: WorldId,
    ) -> Result<Option<DeathRecord>, PersistenceError> {
        self.ensure_initialized()?;
        let removed = self.records.remove(&RecordKey::new(player, world));
        if removed.is_some() {
            self.dirty = true;
        }
        Ok(removed)
    }

    async fn sync(&mut self) -> Result<(), PersistenceError> {
        self.ensure_initialized()?;
        if !self.dirty {
            return Ok(());
        }
        self.write_document()
            .map_err(|e| PersistenceError::Write(e.to_string()))?;
        self.dirty = false;
        tracing::debug!(path = %self.path.display(), count = self.records.len(), "JSON datastore synced");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PersistenceError> {
        if !self.initialized {
            return Ok(());
        }
        let result = self.sync().await;
        self.initialized = false;
        self.dirty = false;
        self.records.clear();
        result
    }

    async fn delete(&mut self) -> Result<bool, PersistenceError> {
        // Unsaved state is discarded along with the file.
        self.initialized = false;
        self.dirty = false;
        self.records.clear();
        if !self.path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.path)?;
        tracing::info!(path = %self.path.display(), "Deleted JSON datastore");
        Ok(true)
    }
}
