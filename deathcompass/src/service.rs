//! The owned entry point the host plugin talks to.
//!
//! [`DeathLocations`] holds the active datastore and the record cache. The
//! host creates one at enable, calls into it from its event handlers, and
//! hands it to [`shutdown`](DeathLocations::shutdown) at disable. Nothing in
//! here surfaces storage errors to the caller: failed reads look like "no
//! death recorded", failed writes are logged and dropped, and a datastore
//! that cannot be opened at all leaves the service running with every
//! operation a no-op.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::cache::RecordCache;
use crate::config::StorageConfig;
use crate::persistence::{self, Datastore, DatastoreType, RecordRepository};
use crate::record::{DeathRecord, PlayerId, WorldId};
use crate::worlds::WorldRegistry;

/// Snapshot for the status command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStatus {
    pub configured: DatastoreType,
    /// `None` when no datastore could be opened.
    pub active: Option<DatastoreType>,
    pub cached_records: usize,
}

pub struct DeathLocations {
    config: StorageConfig,
    worlds: Arc<dyn WorldRegistry>,
    store: Option<Datastore>,
    cache: RecordCache,
    last_sync: Instant,
}

impl DeathLocations {
    /// Open the configured datastore, converting older datastores on disk.
    /// Falls back to the JSON store if the configured one cannot be opened,
    /// and to no datastore at all if that fails too.
    pub async fn start(config: StorageConfig, worlds: Arc<dyn WorldRegistry>) -> Self {
        let store = open_store(&config, worlds.clone()).await;
        Self {
            config,
            worlds,
            store,
            cache: RecordCache::new(),
            last_sync: Instant::now(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn active_type(&self) -> Option<DatastoreType> {
        self.store.as_ref().map(|s| s.store_type())
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn status(&self) -> StoreStatus {
        StoreStatus {
            configured: self.config.datastore,
            active: self.active_type(),
            cached_records: self.cache.len(),
        }
    }

    /// Remember where a player died. The cache is updated before the write is
    /// handed to the datastore, so an immediate lookup sees the new value
    /// even while the write is still queued. A write the datastore rejects
    /// outright is dropped from the cache again.
    pub async fn record_death(&mut self, record: DeathRecord) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        self.cache.put(record);

        if self.config.debug {
            debug!(player = %record.player, world = %record.world, x = record.x, y = record.y, z = record.z, "Recording death location");
        }
        if let Err(e) = store.insert_record(record).await {
            warn!(player = %record.player, world = %record.world, "Failed to save death location: {}", e);
            self.cache.remove(record.player, record.world);
        }
    }

    /// Where `player` last died in `world`, if known.
    pub async fn death_location(&mut self, player: PlayerId, world: WorldId) -> Option<DeathRecord> {
        let store = self.store.as_ref()?;

        if let Some(hit) = self.cache.get(player, world) {
            if self.config.debug {
                debug!(%player, %world, "Death location cache hit");
            }
            return Some(hit);
        }

        if self.config.debug {
            debug!(%player, %world, "Death location cache miss");
        }
        match store.select_record(player, world).await {
            Ok(Some(record)) => {
                self.cache.put(record);
                Some(record)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(%player, %world, "Failed to read death location: {}", e);
                None
            }
        }
    }

    /// Drop cached records for a player who left. Their records stay in the
    /// datastore.
    pub fn forget_player(&mut self, player: PlayerId) {
        let evicted = self.cache.on_player_disconnect(player);
        if self.config.debug && evicted > 0 {
            debug!(%player, evicted, "Evicted cached death locations");
        }
    }

    /// Delete a record from the datastore and the cache.
    pub async fn remove(&mut self, player: PlayerId, world: WorldId) -> Option<DeathRecord> {
        let store = self.store.as_mut()?;
        self.cache.remove(player, world);
        match store.delete_record(player, world).await {
            Ok(prior) => prior,
            Err(e) => {
                warn!(%player, %world, "Failed to delete death location: {}", e);
                None
            }
        }
    }

    /// Every record in the active datastore.
    pub async fn all_records(&mut self) -> Vec<DeathRecord> {
        let Some(store) = self.store.as_mut() else {
            return Vec::new();
        };
        // Queued writes first, so the scan sees them.
        if let Err(e) = store.sync().await {
            warn!("Failed to sync datastore before listing: {}", e);
        }
        match store.select_all_records().await {
            Ok(scan) => scan.records,
            Err(e) => {
                warn!("Failed to list death locations: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn sync(&mut self) {
        self.last_sync = Instant::now();
        let Some(store) = self.store.as_mut() else {
            return;
        };
        if let Err(e) = store.sync().await {
            warn!(store = %store.store_type(), "Failed to sync datastore: {}", e);
        }
    }

    /// Call from the host scheduler; syncs once the autosave interval has
    /// passed since the last sync.
    pub async fn tick(&mut self) {
        if self.last_sync.elapsed() >= self.config.autosave_interval() {
            self.sync().await;
        }
    }

    /// Apply a reloaded configuration. A changed datastore type closes the
    /// current store and connects the new one, which converts the old store's
    /// records. An unchanged type only updates the settings.
    pub async fn reload(&mut self, config: StorageConfig) {
        let switching = self.active_type() != Some(config.datastore);
        self.config = config;
        if !switching {
            return;
        }

        info!(
            from = ?self.active_type(),
            to = %self.config.datastore,
            "Datastore type changed, reconnecting"
        );
        if let Some(mut old) = self.store.take() {
            if let Err(e) = old.close().await {
                warn!(store = %old.store_type(), "Failed to close datastore: {}", e);
            }
        }
        self.cache.clear();
        self.store = open_store(&self.config, self.worlds.clone()).await;
        self.last_sync = Instant::now();
    }

    /// Flush and close the datastore. Queued SQLite writes are drained first.
    pub async fn shutdown(mut self) {
        if let Some(mut store) = self.store.take() {
            if let Err(e) = store.close().await {
                warn!(store = %store.store_type(), "Failed to close datastore: {}", e);
            }
        }
        self.cache.clear();
        info!("Death location storage stopped");
    }
}

async fn open_store(config: &StorageConfig, worlds: Arc<dyn WorldRegistry>) -> Option<Datastore> {
    let mut attempts = vec![config.datastore];
    if config.datastore != DatastoreType::Json {
        attempts.push(DatastoreType::Json);
    }

    for kind in attempts {
        match persistence::connect(kind, config, worlds.clone()).await {
            Ok((store, reports)) => {
                for report in reports {
                    info!(
                        source = %report.source,
                        target = %report.target,
                        read = report.read,
                        inserted = report.inserted,
                        skipped = report.skipped,
                        "Datastore conversion finished"
                    );
                }
                if kind != config.datastore {
                    warn!(configured = %config.datastore, active = %kind, "Using fallback datastore");
                }
                return Some(store);
            }
            Err(e) => {
                error!(store = %kind, "Could not open datastore: {}", e);
            }
        }
    }

    error!("No datastore available, death locations will not be saved");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worlds::StaticWorlds;

    struct Fixture {
        _dir: tempfile::TempDir,
        config: StorageConfig,
        worlds: Arc<StaticWorlds>,
        world: WorldId,
    }

    fn fixture(kind: DatastoreType) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let world = WorldId::random();
        Fixture {
            config: StorageConfig {
                datastore: kind,
                data_dir: dir.path().to_path_buf(),
                debug: true,
                ..StorageConfig::default()
            },
            _dir: dir,
            worlds: Arc::new(StaticWorlds::with_worlds([(world, "world")])),
            world,
        }
    }

    #[tokio::test]
    async fn test_record_then_lookup_hits_cache() {
        let f = fixture(DatastoreType::Sqlite);
        let mut service = DeathLocations::start(f.config.clone(), f.worlds.clone()).await;
        assert_eq!(service.active_type(), Some(DatastoreType::Sqlite));

        let record = DeathRecord::new(PlayerId::random(), f.world, 12.0, 40.0, -8.0);
        service.record_death(record).await;
        assert_eq!(
            service.death_location(record.player, f.world).await,
            Some(record)
        );
        assert_eq!(service.status().cached_records, 1);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_disconnect_evicts_cache_but_not_store() {
        let f = fixture(DatastoreType::Json);
        let mut service = DeathLocations::start(f.config.clone(), f.worlds.clone()).await;
        let record = DeathRecord::new(PlayerId::random(), f.world, 1.0, 2.0, 3.0);
        service.record_death(record).await;

        service.forget_player(record.player);
        assert_eq!(service.status().cached_records, 0);
        // Miss goes to the datastore and repopulates the cache.
        assert_eq!(
            service.death_location(record.player, f.world).await,
            Some(record)
        );
        assert_eq!(service.status().cached_records, 1);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_remove_clears_both_layers() {
        let f = fixture(DatastoreType::Sqlite);
        let mut service = DeathLocations::start(f.config.clone(), f.worlds.clone()).await;
        let record = DeathRecord::new(PlayerId::random(), f.world, 5.0, 6.0, 7.0);
        service.record_death(record).await;

        assert_eq!(service.remove(record.player, f.world).await, Some(record));
        assert_eq!(service.death_location(record.player, f.world).await, None);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_then_restart_keeps_records() {
        let f = fixture(DatastoreType::Sqlite);
        let record = DeathRecord::new(PlayerId::random(), f.world, -100.5, 12.0, 3.75);

        let mut service = DeathLocations::start(f.config.clone(), f.worlds.clone()).await;
        service.record_death(record).await;
        service.shutdown().await;

        let mut service = DeathLocations::start(f.config.clone(), f.worlds.clone()).await;
        assert_eq!(
            service.death_location(record.player, f.world).await,
            Some(record)
        );
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_reload_with_new_type_converts_records() {
        let f = fixture(DatastoreType::Json);
        let mut service = DeathLocations::start(f.config.clone(), f.worlds.clone()).await;
        let records: Vec<_> = (0..3)
            .map(|i| DeathRecord::new(PlayerId::random(), f.world, i as f64, 64.0, 0.0))
            .collect();
        for record in &records {
            service.record_death(*record).await;
        }

        let mut sqlite = f.config.clone();
        sqlite.datastore = DatastoreType::Sqlite;
        service.reload(sqlite).await;

        assert_eq!(service.active_type(), Some(DatastoreType::Sqlite));
        assert_eq!(service.status().cached_records, 0);
        assert!(!f.config.artifact_path(DatastoreType::Json).exists());
        let mut all = service.all_records().await;
        all.sort_by(|a, b| a.x.total_cmp(&b.x));
        assert_eq!(all, records);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_reload_same_type_keeps_store_and_cache() {
        let f = fixture(DatastoreType::Json);
        let mut service = DeathLocations::start(f.config.clone(), f.worlds.clone()).await;
        service
            .record_death(DeathRecord::new(PlayerId::random(), f.world, 0.0, 0.0, 0.0))
            .await;

        let mut quiet = f.config.clone();
        quiet.debug = false;
        service.reload(quiet).await;
        assert!(!service.config().debug);
        assert_eq!(service.active_type(), Some(DatastoreType::Json));
        assert_eq!(service.status().cached_records, 1);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_falls_back_to_json_when_sqlite_unusable() {
        let f = fixture(DatastoreType::Sqlite);
        // A directory where the database file should be makes SQLite fail.
        std::fs::create_dir_all(f.config.artifact_path(DatastoreType::Sqlite)).unwrap();

        let mut service = DeathLocations::start(f.config.clone(), f.worlds.clone()).await;
        assert_eq!(service.active_type(), Some(DatastoreType::Json));
        let record = DeathRecord::new(PlayerId::random(), f.world, 1.0, 1.0, 1.0);
        service.record_death(record).await;
        assert_eq!(
            service.death_location(record.player, f.world).await,
            Some(record)
        );
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_rejected_write_is_not_served_from_cache() {
        let f = fixture(DatastoreType::Sqlite);
        let mut service = DeathLocations::start(f.config.clone(), f.worlds.clone()).await;

        let unregistered = WorldId::random();
        let record = DeathRecord::new(PlayerId::random(), unregistered, 5.0, 5.0, 5.0);
        service.record_death(record).await;
        assert_eq!(service.death_location(record.player, unregistered).await, None);
        assert_eq!(service.status().cached_records, 0);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_degraded_mode_is_a_silent_noop() {
        let f = fixture(DatastoreType::Sqlite);
        std::fs::create_dir_all(f.config.artifact_path(DatastoreType::Sqlite)).unwrap();
        std::fs::create_dir_all(f.config.artifact_path(DatastoreType::Json)).unwrap();

        let mut service = DeathLocations::start(f.config.clone(), f.worlds.clone()).await;
        assert!(!service.is_enabled());
        let record = DeathRecord::new(PlayerId::random(), f.world, 1.0, 1.0, 1.0);
        service.record_death(record).await;
        assert_eq!(service.death_location(record.player, f.world).await, None);
        assert!(service.all_records().await.is_empty());
        assert_eq!(
            service.status(),
            StoreStatus {
                configured: DatastoreType::Sqlite,
                active: None,
                cached_records: 0,
            }
        );
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_tick_syncs_json_after_interval() {
        let mut f = fixture(DatastoreType::Json);
        f.config.autosave_interval_secs = 0;
        let mut service = DeathLocations::start(f.config.clone(), f.worlds.clone()).await;
        let record = DeathRecord::new(PlayerId::random(), f.world, 9.0, 9.0, 9.0);
        service.record_death(record).await;
        service.tick().await;

        let raw = std::fs::read_to_string(f.config.artifact_path(DatastoreType::Json)).unwrap();
        assert!(raw.contains(&record.player.to_string()));
        service.shutdown().await;
    }
}
