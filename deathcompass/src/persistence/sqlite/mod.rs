//! SQLite-backed datastore.
//!
//! ## Database setup
//!
//! [`Database`] wraps a `sqlx::SqlitePool` configured with:
//! - **WAL mode**: the background writer and inline readers do not block
//!   each other.
//! - **`synchronous = NORMAL`**: durable at checkpoint, fast enough for a
//!   write per player death.
//!
//! ## Schema versions
//!
//! The `schema_version` table holds a single integer. Version 0 (no marker,
//! player and world stored as strings) is upgraded in place to version 1 on
//! the first open; see [`schema`].
//!
//! ## Writes
//!
//! Upserts are handed to a background writer task over a bounded channel and
//! applied in submission order. Reads run inline on the caller. `sync()`
//! waits for the queue to drain; `close()` drains it and stops the task.

mod database;
pub(crate) mod helpers;
mod record_repo;
pub mod schema;
mod writer;

pub use database::Database;
pub use record_repo::SqliteDatastore;
pub use schema::{SchemaStatus, CURRENT_SCHEMA_VERSION};
