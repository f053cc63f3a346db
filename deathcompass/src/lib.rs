//! Death location storage for the DeathCompass plugin.
//!
//! When a player dies the host records where; when they respawn it asks for
//! that location again to point a compass at it. This crate is the storage
//! half of that:
//!
//! - [`DeathRecord`]: one player's last death position in one world.
//! - [`RecordCache`]: read-through cache, evicted per player on disconnect.
//! - [`persistence`]: the JSON-file and SQLite datastores behind one
//!   [`RecordRepository`] interface, plus [`persistence::connect`], which
//!   opens the configured datastore and converts any other one left on disk.
//! - [`DeathLocations`]: the owned handle the host holds for the lifetime of
//!   the plugin.
//!
//! The host supplies a [`WorldRegistry`] so the stores can resolve world ids
//! and legacy world names.

pub mod cache;
pub mod config;
pub mod logging;
pub mod persistence;
pub mod record;
pub mod service;
pub mod worlds;

pub use cache::RecordCache;
pub use config::{ConfigError, StorageConfig};
pub use persistence::{Datastore, DatastoreType, PersistenceError, RecordRepository};
pub use record::{DeathRecord, PlayerId, RecordKey, WorldId};
pub use service::{DeathLocations, StoreStatus};
pub use worlds::{StaticWorlds, WorldRegistry};
