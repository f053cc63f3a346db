//! Lookup of the host's loaded worlds.
//!
//! The stores never talk to the host directly. They resolve world ids to
//! display names (the SQLite table caches the name next to the id) and legacy
//! display names back to ids through a [`WorldRegistry`]. A world the registry
//! does not know is "unresolvable": rows pointing at it are skipped during
//! bulk reads, bulk inserts and conversions.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::record::WorldId;

pub trait WorldRegistry: Send + Sync {
    /// Display name of a loaded world.
    fn world_name(&self, id: &WorldId) -> Option<String>;

    /// Resolve a display name (as stored by the legacy schema) to its id.
    fn world_id(&self, name: &str) -> Option<WorldId>;
}

/// Registry backed by an in-process map, filled in by the host as worlds load.
#[derive(Default)]
pub struct StaticWorlds {
    by_id: RwLock<HashMap<WorldId, String>>,
}

impl StaticWorlds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_worlds<I, S>(worlds: I) -> Self
    where
        I: IntoIterator<Item = (WorldId, S)>,
        S: Into<String>,
    {
        let registry = Self::new();
        for (id, name) in worlds {
            registry.register(id, name);
        }
        registry
    }

    pub fn register(&self, id: WorldId, name: impl Into<String>) {
        let mut by_id = self.by_id.write().unwrap_or_else(|e| e.into_inner());
        by_id.insert(id, name.into());
    }

    pub fn unregister(&self, id: &WorldId) -> Option<String> {
        let mut by_id = self.by_id.write().unwrap_or_else(|e| e.into_inner());
        by_id.remove(id)
    }
}

impl WorldRegistry for StaticWorlds {
    fn world_name(&self, id: &WorldId) -> Option<String> {
        let by_id = self.by_id.read().unwrap_or_else(|e| e.into_inner());
        by_id.get(id).cloned()
    }

    fn world_id(&self, name: &str) -> Option<WorldId> {
        let by_id = self.by_id.read().unwrap_or_else(|e| e.into_inner());
        by_id
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(id, _)| *id)
    }
}
