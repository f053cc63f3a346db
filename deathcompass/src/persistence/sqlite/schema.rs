//! Schema version detection and the v0 → v1 upgrade.
//!
//! | Version | Key columns | Coordinates |
//! |---------|-------------|-------------|
//! | 0 | `player TEXT`, `worldname TEXT` | `INTEGER` |
//! | 1 | player and world uuids split into msb/lsb `INTEGER` pairs | `REAL` |
//!
//! A v0 database has a `death_locations` table and no `schema_version` table.
//! The upgrade reads every legacy row, drops the table, recreates it with the
//! v1 layout, reinserts the rows and writes the marker, all in one
//! transaction. Legacy rows whose player is not a uuid, or whose world name
//! the registry cannot resolve, are dropped.

use sqlx::SqlitePool;
use tracing::info;

use super::helpers::{upsert_location, LocationRow, CREATE_TABLE_V1};
use crate::persistence::PersistenceError;
use crate::record::{DeathRecord, PlayerId};
use crate::worlds::WorldRegistry;

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Outcome of preparing the schema on open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaStatus {
    pub version: u32,
    /// Set when this open performed an upgrade.
    pub upgraded_from: Option<u32>,
}

/// Bring the database to [`CURRENT_SCHEMA_VERSION`].
pub async fn prepare_schema(
    pool: &SqlitePool,
    worlds: &dyn WorldRegistry,
) -> Result<SchemaStatus, PersistenceError> {
    let stored = stored_version(pool).await?;
    let has_table = table_exists(pool, "death_locations").await?;

    match stored {
        Some(found) if found > CURRENT_SCHEMA_VERSION => Err(PersistenceError::UnsupportedSchema {
            found,
            supported: CURRENT_SCHEMA_VERSION,
        }),
        Some(CURRENT_SCHEMA_VERSION) => {
            sqlx::query(CREATE_TABLE_V1).execute(pool).await?;
            Ok(SchemaStatus {
                version: CURRENT_SCHEMA_VERSION,
                upgraded_from: None,
            })
        }
        // No marker (or a zero marker) next to an existing table means v0.
        _ if has_table => upgrade_v0(pool, worlds).await,
        _ => {
            let mut tx = pool.begin().await?;
            sqlx::query(CREATE_TABLE_V1).execute(&mut *tx).await?;
            write_version(&mut tx, CURRENT_SCHEMA_VERSION).await?;
            tx.commit().await?;
            info!(version = CURRENT_SCHEMA_VERSION, "Created death location schema");
            Ok(SchemaStatus {
                version: CURRENT_SCHEMA_VERSION,
                upgraded_from: None,
            })
        }
    }
}

/// The persisted marker, or `None` when there is no marker table.
pub async fn stored_version(pool: &SqlitePool) -> Result<Option<u32>, PersistenceError> {
    if !table_exists(pool, "schema_version").await? {
        return Ok(None);
    }
    // MAX over an empty table yields a single NULL row.
    let row: (Option<i64>,) = sqlx::query_as("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await?;
    let version = row.0.unwrap_or(0);
    u32::try_from(version).map(Some).map_err(|_| {
        PersistenceError::SchemaMigration(format!("invalid schema version marker {version}"))
    })
}

async fn table_exists(pool: &SqlitePool, name: &str) -> Result<bool, PersistenceError> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ? LIMIT 1")
            .bind(name)
            .fetch_optional(pool)
            .await?;
    Ok(row.is_some())
}

async fn write_version(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    version: u32,
) -> Result<(), sqlx::Error> {
    sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .execute(&mut **tx)
        .await?;
    sqlx::query("DELETE FROM schema_version")
        .execute(&mut **tx)
        .await?;
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(version as i64)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn upgrade_v0(
    pool: &SqlitePool,
    worlds: &dyn WorldRegistry,
) -> Result<SchemaStatus, PersistenceError> {
    info!("Upgrading death location schema from version 0");

    let legacy: Vec<(String, String, f64, f64, f64)> = sqlx::query_as(
        "SELECT player, worldname, CAST(x AS REAL), CAST(y AS REAL), CAST(z AS REAL) \
         FROM death_locations",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| PersistenceError::SchemaMigration(format!("reading v0 rows: {e}")))?;

    let total = legacy.len();
    let mut rows = Vec::with_capacity(total);
    for (player, world_name, x, y, z) in legacy {
        let Ok(player_id) = player.parse::<PlayerId>() else {
            tracing::warn!(%player, "Dropping legacy row: player is not a uuid");
            continue;
        };
        let Some(world_id) = worlds.world_id(&world_name) else {
            tracing::warn!(%player, world = %world_name, "Dropping legacy row: unknown world");
            continue;
        };
        rows.push(LocationRow {
            record: DeathRecord::new(player_id, world_id, x, y, z),
            world_name,
        });
    }

    let migrate = async {
        let mut tx = pool.begin().await?;
        sqlx::query("DROP TABLE death_locations")
            .execute(&mut *tx)
            .await?;
        sqlx::query(CREATE_TABLE_V1).execute(&mut *tx).await?;
        for row in &rows {
            upsert_location(&mut *tx, row).await?;
        }
        write_version(&mut tx, CURRENT_SCHEMA_VERSION).await?;
        tx.commit().await?;
        Ok::<(), sqlx::Error>(())
    };
    migrate
        .await
        .map_err(|e| PersistenceError::SchemaMigration(e.to_string()))?;

    info!(
        migrated = rows.len(),
        dropped = total - rows.len(),
        version = CURRENT_SCHEMA_VERSION,
        "Death location schema upgraded"
    );

    Ok(SchemaStatus {
        version: CURRENT_SCHEMA_VERSION,
        upgraded_from: Some(0),
    })
}
