//! Read-through accelerator in front of the active datastore.
//!
//! The cache never owns a record: the datastore is the source of truth and
//! a miss here only means "ask the datastore". Entries are evicted per player
//! when the host reports a disconnect.

use std::collections::HashMap;

use crate::record::{DeathRecord, PlayerId, RecordKey, WorldId};

#[derive(Debug, Default)]
pub struct RecordCache {
    entries: HashMap<RecordKey, DeathRecord>,
}

impl RecordCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, player: PlayerId, world: WorldId) -> Option<DeathRecord> {
        self.entries.get(&RecordKey::new(player, world)).copied()
    }

    /// Insert or overwrite the entry for the record's key.
    pub fn put(&mut self, record: DeathRecord) {
        self.entries.insert(record.key(), record);
    }

    pub fn remove(&mut self, player: PlayerId, world: WorldId) -> Option<DeathRecord> {
        self.entries.remove(&RecordKey::new(player, world))
    }

    /// Drop every entry belonging to `player`. Returns how many were dropped.
    pub fn on_player_disconnect(&mut self, player: PlayerId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.player != player);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
