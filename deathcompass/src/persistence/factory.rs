//! Datastore selection and conversion between datastore types.
//!
//! [`connect`] opens the configured datastore and then drains every other
//! datastore type whose file is still on disk into it. A successful
//! conversion deletes the source file, so each conversion runs once. A
//! source that fails to open or to drain is logged and left in place; the
//! target store is returned regardless.

use std::sync::Arc;

use tracing::{info, warn};

use super::{Datastore, DatastoreType, PersistenceError, RecordRepository};
use crate::config::StorageConfig;
use crate::worlds::WorldRegistry;

/// Counts from draining one source datastore into the active one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionReport {
    pub source: DatastoreType,
    pub target: DatastoreType,
    /// Records read from the source.
    pub read: usize,
    /// Records submitted to the target.
    pub inserted: usize,
    /// Rows dropped on either side because their world could not be resolved.
    pub skipped: usize,
}

/// Open the `kind` datastore and convert any other datastore types found on
/// disk into it.
pub async fn connect(
    kind: DatastoreType,
    config: &StorageConfig,
    worlds: Arc<dyn WorldRegistry>,
) -> Result<(Datastore, Vec<ConversionReport>), PersistenceError> {
    let mut store = Datastore::from_config(kind, config, worlds.clone());
    store.initialize().await?;

    let mut reports = Vec::new();
    for other in DatastoreType::ALL.into_iter().filter(|t| *t != kind) {
        let mut source = Datastore::from_config(other, config, worlds.clone());
        if !source.exists() {
            continue;
        }

        info!(source = %other, target = %kind, "Found old datastore, converting");
        match convert(&mut source, &mut store).await {
            Ok(Some(report)) => reports.push(report),
            Ok(None) => {}
            Err(e) => {
                warn!(source = %other, target = %kind, "Datastore conversion failed: {}", e);
                if let Err(e) = source.close().await {
                    warn!(source = %other, "Failed to close datastore after failed conversion: {}", e);
                }
            }
        }
    }

    Ok((store, reports))
}

/// Move every record from `source` into `target`, then delete `source`.
///
/// Returns `Ok(None)` without touching either store when both are the same
/// type.
pub async fn convert<S, T>(
    source: &mut S,
    target: &mut T,
) -> Result<Option<ConversionReport>, PersistenceError>
where
    S: RecordRepository,
    T: RecordRepository,
{
    let source_type = source.store_type();
    let target_type = target.store_type();
    if source_type == target_type {
        return Ok(None);
    }
    let fail = |e: PersistenceError| PersistenceError::conversion(source_type, e);

    if !source.is_initialized() {
        source.initialize().await.map_err(fail)?;
    }

    let scan = source.select_all_records().await.map_err(fail)?;
    let read = scan.records.len();
    let inserted = target.insert_records(scan.records).await.map_err(fail)?;
    info!(source = %source_type, target = %target_type, count = inserted, "Converted death locations");

    target.sync().await.map_err(fail)?;

    source.close().await.map_err(fail)?;
    source.delete().await.map_err(fail)?;

    Ok(Some(ConversionReport {
        source: source_type,
        target: target_type,
        read,
        inserted,
        skipped: scan.skipped + (read - inserted),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{DeathRecord, PlayerId, WorldId};
    use crate::worlds::StaticWorlds;

    fn config_in(dir: &tempfile::TempDir, kind: DatastoreType) -> StorageConfig {
        StorageConfig {
            datastore: kind,
            data_dir: dir.path().to_path_buf(),
            ..StorageConfig::default()
        }
    }

    async fn seed(
        kind: DatastoreType,
        config: &StorageConfig,
        worlds: Arc<dyn WorldRegistry>,
        records: &[DeathRecord],
    ) {
        let mut store = Datastore::from_config(kind, config, worlds);
        store.initialize().await.unwrap();
        store.insert_records(records.to_vec()).await.unwrap();
        store.sync().await.unwrap();
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_fresh_creates_only_configured_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir, DatastoreType::Sqlite);
        let worlds: Arc<dyn WorldRegistry> = Arc::new(StaticWorlds::new());

        let (mut store, reports) = connect(DatastoreType::Sqlite, &config, worlds).await.unwrap();
        assert_eq!(store.store_type(), DatastoreType::Sqlite);
        assert!(store.is_initialized());
        assert!(reports.is_empty());
        assert!(!DatastoreType::Json.artifact_path(&config.data_dir).exists());
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_converts_json_into_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let world = WorldId::random();
        let worlds: Arc<dyn WorldRegistry> = Arc::new(StaticWorlds::with_worlds([(world, "world")]));
        let config = config_in(&dir, DatastoreType::Sqlite);
        let records: Vec<_> = (0..4)
            .map(|i| DeathRecord::new(PlayerId::random(), world, i as f64, 64.0, 0.5))
            .collect();
        seed(DatastoreType::Json, &config, worlds.clone(), &records).await;

        let (mut store, reports) = connect(DatastoreType::Sqlite, &config, worlds).await.unwrap();
        assert_eq!(
            reports,
            vec![ConversionReport {
                source: DatastoreType::Json,
                target: DatastoreType::Sqlite,
                read: 4,
                inserted: 4,
                skipped: 0,
            }]
        );
        assert!(!DatastoreType::Json.artifact_path(&config.data_dir).exists());
        for record in &records {
            let found = store.select_record(record.player, world).await.unwrap();
            assert_eq!(found, Some(*record));
        }
        store.close().await.unwrap();

        // Nothing left to convert on the next start.
        let worlds: Arc<dyn WorldRegistry> = Arc::new(StaticWorlds::with_worlds([(world, "world")]));
        let (mut again, reports) = connect(DatastoreType::Sqlite, &config, worlds).await.unwrap();
        assert!(reports.is_empty());
        again.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_same_type_convert_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let world = WorldId::random();
        let worlds: Arc<dyn WorldRegistry> = Arc::new(StaticWorlds::with_worlds([(world, "world")]));
        let config = config_in(&dir, DatastoreType::Json);
        seed(
            DatastoreType::Json,
            &config,
            worlds.clone(),
            &[DeathRecord::new(PlayerId::random(), world, 1.0, 2.0, 3.0)],
        )
        .await;

        let mut source = Datastore::from_config(DatastoreType::Json, &config, worlds.clone());
        let mut target = Datastore::from_config(DatastoreType::Json, &config, worlds);
        let report = convert(&mut source, &mut target).await.unwrap();
        assert_eq!(report, None);
        assert!(!source.is_initialized());
        assert!(!target.is_initialized());
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_broken_source_does_not_block_target() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir, DatastoreType::Sqlite);
        let json_path = DatastoreType::Json.artifact_path(&config.data_dir);
        std::fs::write(&json_path, "this is not json").unwrap();

        let worlds: Arc<dyn WorldRegistry> = Arc::new(StaticWorlds::new());
        let (mut store, reports) = connect(DatastoreType::Sqlite, &config, worlds).await.unwrap();
        assert!(store.is_initialized());
        assert!(reports.is_empty());
        // Left in place for the operator to inspect.
        assert!(json_path.exists());
        store.close().await.unwrap();
    }
}
