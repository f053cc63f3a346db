//! Capability interface shared by every datastore variant.
//!
//! Methods return `impl Future + Send` rather than using `async fn` so the
//! futures stay `Send` when a caller moves a store into a spawned task.

use std::future::Future;

use super::{DatastoreType, PersistenceError};
use crate::record::{DeathRecord, PlayerId, WorldId};

/// Result of a full scan. Rows that could not be turned into a record
/// (unparseable ids, worlds the registry does not know) are counted, not
/// returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordScan {
    pub records: Vec<DeathRecord>,
    pub skipped: usize,
}

/// Durable storage for death records, keyed by (player, world).
///
/// Every operation except `initialize`, `exists` and `delete` requires an
/// initialized store and fails with [`PersistenceError::NotInitialized`]
/// otherwise. Inserts are upserts: a second insert for the same key replaces
/// the first.
pub trait RecordRepository: Send + Sync {
    fn store_type(&self) -> DatastoreType;

    fn is_initialized(&self) -> bool;

    /// Whether the on-disk artifact for this store exists.
    fn exists(&self) -> bool;

    /// Create or load whatever the store needs. Calling it on an initialized
    /// store is a no-op.
    fn initialize(&mut self) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    fn select_record(
        &self,
        player: PlayerId,
        world: WorldId,
    ) -> impl Future<Output = Result<Option<DeathRecord>, PersistenceError>> + Send;

    /// Full scan in unspecified order. Only conversions use this.
    fn select_all_records(&self)
        -> impl Future<Output = Result<RecordScan, PersistenceError>> + Send;

    /// Upsert one record. Durability may lag behind the returned future;
    /// call [`sync`](Self::sync) to force it.
    fn insert_record(
        &mut self,
        record: DeathRecord,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    /// Upsert many records. Returns how many were submitted; records in
    /// unresolvable worlds are skipped and not counted.
    fn insert_records(
        &mut self,
        records: Vec<DeathRecord>,
    ) -> impl Future<Output = Result<usize, PersistenceError>> + Send;

    /// Remove a record, returning the value it held.
    fn delete_record(
        &mut self,
        player: PlayerId,
        world: WorldId,
    ) -> impl Future<Output = Result<Option<DeathRecord>, PersistenceError>> + Send;

    /// Force buffered writes to disk.
    fn sync(&mut self) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    /// Release the underlying resources. The store is uninitialized afterwards.
    fn close(&mut self) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    /// Erase the on-disk artifact, closing the store first if needed.
    /// Returns whether anything was removed.
    fn delete(&mut self) -> impl Future<Output = Result<bool, PersistenceError>> + Send;
}
