//! SQLite-backed implementation of [`RecordRepository`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::database::Database;
use super::helpers::{decode_row, LocationRow, SELECT_ALL};
use super::schema::{prepare_schema, SchemaStatus};
use super::writer::RecordWriter;
use crate::persistence::{DatastoreType, PersistenceError, RecordRepository, RecordScan};
use crate::record::{DeathRecord, PlayerId, WorldId};
use crate::worlds::WorldRegistry;

struct OpenDatabase {
    db: Database,
    writer: RecordWriter,
    schema: SchemaStatus,
}

pub struct SqliteDatastore {
    path: PathBuf,
    worlds: Arc<dyn WorldRegistry>,
    write_queue_capacity: usize,
    open: Option<OpenDatabase>,
}

impl SqliteDatastore {
    pub fn new(path: PathBuf, worlds: Arc<dyn WorldRegistry>, write_queue_capacity: usize) -> Self {
        Self {
            path,
            worlds,
            write_queue_capacity,
            open: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Schema state as of the last `initialize`.
    pub fn schema_status(&self) -> Option<SchemaStatus> {
        self.open.as_ref().map(|o| o.schema)
    }

    fn opened(&self) -> Result<&OpenDatabase, PersistenceError> {
        self.open
            .as_ref()
            .ok_or(PersistenceError::NotInitialized(DatastoreType::Sqlite))
    }

    fn row_for(&self, record: DeathRecord) -> Option<LocationRow> {
        self.worlds
            .world_name(&record.world)
            .map(|world_name| LocationRow { record, world_name })
    }

    fn side_files(&self) -> [PathBuf; 3] {
        let base = self.path.as_os_str().to_owned();
        let with_suffix = |suffix: &str| {
            let mut p = base.clone();
            p.push(suffix);
            PathBuf::from(p)
        };
        [self.path.clone(), with_suffix("-wal"), with_suffix("-shm")]
    }
}

impl RecordRepository for SqliteDatastore {
    fn store_type(&self) -> DatastoreType {
        DatastoreType::Sqlite
    }

    fn is_initialized(&self) -> bool {
        self.open.is_some()
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }

    async fn initialize(&mut self) -> Result<(), PersistenceError> {
        if self.open.is_some() {
            return Ok(());
        }

        let init = |e: PersistenceError| PersistenceError::initialization(DatastoreType::Sqlite, e);

        let db = Database::open(&self.path).await.map_err(init)?;
        let schema = match prepare_schema(db.pool(), self.worlds.as_ref()).await {
            Ok(schema) => schema,
            Err(e) => {
                db.close().await;
                return Err(init(e));
            }
        };
        let writer = RecordWriter::spawn(db.pool().clone(), self.write_queue_capacity);

        tracing::info!(
            path = %self.path.display(),
            version = schema.version,
            upgraded_from = ?schema.upgraded_from,
            "SQLite datastore opened"
        );
        self.open = Some(OpenDatabase { db, writer, schema });
        Ok(())
    }

    async fn select_record(
        &self,
        player: PlayerId,
        world: WorldId,
    ) -> Result<Option<DeathRecord>, PersistenceError> {
        let open = self.opened()?;
        let (p_msb, p_lsb) = player.to_parts();
        let (w_msb, w_lsb) = world.to_parts();

        let row: Option<(f64, f64, f64)> = sqlx::query_as(
            "SELECT x, y, z FROM death_locations \
             WHERE player_uid_msb = ? AND player_uid_lsb = ? \
               AND world_uid_msb = ? AND world_uid_lsb = ?",
        )
        .bind(p_msb)
        .bind(p_lsb)
        .bind(w_msb)
        .bind(w_lsb)
        .fetch_optional(open.db.pool())
        .await
        .map_err(|e| PersistenceError::Read(e.to_string()))?;

        Ok(row.map(|(x, y, z)| DeathRecord::new(player, world, x, y, z)))
    }

    async fn select_all_records(&self) -> Result<RecordScan, PersistenceError> {
        let open = self.opened()?;
        let rows = sqlx::query(SELECT_ALL)
            .fetch_all(open.db.pool())
            .await
            .map_err(|e| PersistenceError::Read(e.to_string()))?;

        let mut scan = RecordScan::default();
        for (index, raw) in rows.iter().enumerate() {
            let row = match decode_row(raw) {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!(row = index, "Skipping unreadable death location row: {}", e);
                    scan.skipped += 1;
                    continue;
                }
            };
            if self.worlds.world_name(&row.record.world).is_none() {
                tracing::warn!(
                    player = %row.record.player,
                    world = %row.world_name,
                    "Skipping record in unknown world"
                );
                scan.skipped += 1;
                continue;
            }
            scan.records.push(row.record);
        }
        Ok(scan)
    }

    async fn insert_record(&mut self, record: DeathRecord) -> Result<(), PersistenceError> {
        let open = self.opened()?;
        let row = self
            .row_for(record)
            .ok_or(PersistenceError::UnknownWorld(record.world))?;
        open.writer.submit(row).await
    }

    async fn insert_records(&mut self, records: Vec<DeathRecord>) -> Result<usize, PersistenceError> {
        let open = self.opened()?;
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            match self.row_for(record) {
                Some(row) => rows.push(row),
                None => {
                    tracing::warn!(player = %record.player, world = %record.world, "Not inserting record in unknown world");
                }
            }
        }
        let count = rows.len();
        open.writer.submit_batch(rows).await?;
        Ok(count)
    }

    async fn delete_record(
        &mut self,
        player: PlayerId,
        world: WorldId,
    ) -> Result<Option<DeathRecord>, PersistenceError> {
        let open = self.opened()?;
        // Queued upserts for this key must land before we read the prior value.
        open.writer.flush().await?;

        let (p_msb, p_lsb) = player.to_parts();
        let (w_msb, w_lsb) = world.to_parts();
        let mut tx = open.db.pool().begin().await?;

        let prior: Option<(f64, f64, f64)> = sqlx::query_as(
            "SELECT x, y, z FROM death_locations \
             WHERE player_uid_msb = ? AND player_uid_lsb = ? \
               AND world_uid_msb = ? AND world_uid_lsb = ?",
        )
        .bind(p_msb)
        .bind(p_lsb)
        .bind(w_msb)
        .bind(w_lsb)
        .fetch_optional(&mut *tx)
        .await?;

        if prior.is_some() {
            sqlx::query(
                "DELETE FROM death_locations \
                 WHERE player_uid_msb = ? AND player_uid_lsb = ? \
                   AND world_uid_msb = ? AND world_uid_lsb = ?",
            )
            .bind(p_msb)
            .bind(p_lsb)
            .bind(w_msb)
            .bind(w_lsb)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(prior.map(|(x, y, z)| DeathRecord::new(player, world, x, y, z)))
    }

    async fn sync(&mut self) -> Result<(), PersistenceError> {
        self.opened()?.writer.flush().await
    }

    async fn close(&mut self) -> Result<(), PersistenceError> {
        let Some(open) = self.open.take() else {
            return Ok(());
        };
        open.writer.shutdown().await;
        open.db.close().await;
        tracing::info!(path = %self.path.display(), "SQLite datastore closed");
        Ok(())
    }

    async fn delete(&mut self) -> Result<bool, PersistenceError> {
        self.close().await?;
        let [db_file, wal, shm] = self.side_files();
        for side in [wal, shm] {
            if side.exists() {
                std::fs::remove_file(&side)?;
            }
        }
        if !db_file.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&db_file)?;
        tracing::info!(path = %db_file.display(), "Deleted SQLite datastore");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::sqlite::schema::tests::create_v0;
    use crate::persistence::sqlite::CURRENT_SCHEMA_VERSION;
    use crate::worlds::StaticWorlds;

    fn store_in(dir: &tempfile::TempDir, worlds: Arc<StaticWorlds>) -> SqliteDatastore {
        SqliteDatastore::new(dir.path().join("deathlocations.db"), worlds, 32)
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir, Arc::new(StaticWorlds::new()));
        assert!(!store.exists());
        store.initialize().await.unwrap();
        store.initialize().await.unwrap();
        assert!(store.is_initialized());
        assert!(store.exists());
        assert_eq!(
            store.schema_status().unwrap().version,
            CURRENT_SCHEMA_VERSION
        );
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_select_missing_is_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir, Arc::new(StaticWorlds::new()));
        store.initialize().await.unwrap();
        let found = store
            .select_record(PlayerId::random(), WorldId::random())
            .await
            .unwrap();
        assert_eq!(found, None);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_unknown_world_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir, Arc::new(StaticWorlds::new()));
        store.initialize().await.unwrap();
        let record = DeathRecord::new(PlayerId::random(), WorldId::random(), 0.0, 0.0, 0.0);
        let result = store.insert_record(record).await;
        assert!(matches!(result, Err(PersistenceError::UnknownWorld(w)) if w == record.world));
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_writes_after_close_fail() {
        let dir = tempfile::tempdir().unwrap();
        let world = WorldId::random();
        let mut store = store_in(&dir, Arc::new(StaticWorlds::with_worlds([(world, "world")])));
        store.initialize().await.unwrap();
        store.close().await.unwrap();
        let result = store
            .insert_record(DeathRecord::new(PlayerId::random(), world, 0.0, 0.0, 0.0))
            .await;
        assert!(matches!(
            result,
            Err(PersistenceError::NotInitialized(DatastoreType::Sqlite))
        ));
    }

    #[tokio::test]
    async fn test_unsupported_schema_fails_initialization() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deathlocations.db");
        {
            let db = Database::open(&path).await.unwrap();
            sqlx::query("CREATE TABLE schema_version (version INTEGER NOT NULL)")
                .execute(db.pool())
                .await
                .unwrap();
            sqlx::query("INSERT INTO schema_version (version) VALUES (2)")
                .execute(db.pool())
                .await
                .unwrap();
            db.close().await;
        }

        let mut store = SqliteDatastore::new(path, Arc::new(StaticWorlds::new()), 8);
        let result = store.initialize().await;
        assert!(matches!(
            result,
            Err(PersistenceError::Initialization {
                store: DatastoreType::Sqlite,
                ..
            })
        ));
        assert!(!store.is_initialized());
    }

    #[tokio::test]
    async fn test_legacy_file_upgrades_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deathlocations.db");
        let world = WorldId::random();
        let player = PlayerId::random();
        {
            let db = Database::open(&path).await.unwrap();
            create_v0(db.pool(), &[(player.to_string().as_str(), "world", 3, 70, -9)]).await;
            db.close().await;
        }

        let mut store = SqliteDatastore::new(
            path,
            Arc::new(StaticWorlds::with_worlds([(world, "world")])),
            8,
        );
        store.initialize().await.unwrap();
        assert_eq!(store.schema_status().unwrap().upgraded_from, Some(0));
        let found = store.select_record(player, world).await.unwrap().unwrap();
        assert_eq!(found.coordinates(), (3.0, 70.0, -9.0));
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_removes_database_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir, Arc::new(StaticWorlds::new()));
        store.initialize().await.unwrap();
        assert!(store.delete().await.unwrap());
        assert!(!store.is_initialized());
        assert!(!store.exists());
        for side in store.side_files() {
            assert!(!side.exists(), "{} should be gone", side.display());
        }
        assert!(!store.delete().await.unwrap());
    }
}
