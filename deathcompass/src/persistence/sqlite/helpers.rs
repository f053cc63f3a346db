//! Row type and shared statements for the `death_locations` table.

use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};

use crate::record::{DeathRecord, PlayerId, WorldId};

pub const CREATE_TABLE_V1: &str = r#"
    CREATE TABLE IF NOT EXISTS death_locations (
        player_uid_msb INTEGER NOT NULL,
        player_uid_lsb INTEGER NOT NULL,
        worldname      TEXT    NOT NULL,
        world_uid_msb  INTEGER NOT NULL,
        world_uid_lsb  INTEGER NOT NULL,
        x              REAL    NOT NULL,
        y              REAL    NOT NULL,
        z              REAL    NOT NULL,
        UNIQUE (player_uid_msb, player_uid_lsb, world_uid_msb, world_uid_lsb)
    )
"#;

/// One v1 row: a record plus the world name cached next to it.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationRow {
    pub record: DeathRecord,
    pub world_name: String,
}

pub const SELECT_ALL: &str = "SELECT player_uid_msb, player_uid_lsb, worldname, \
     world_uid_msb, world_uid_lsb, x, y, z FROM death_locations";

/// Decode one row selected by [`SELECT_ALL`]. Columns are read one at a
/// time so a single malformed row can be reported without failing a scan.
pub fn decode_row(row: &SqliteRow) -> Result<LocationRow, sqlx::Error> {
    let player = PlayerId::from_parts(row.try_get(0)?, row.try_get(1)?);
    let world_name: String = row.try_get(2)?;
    let world = WorldId::from_parts(row.try_get(3)?, row.try_get(4)?);
    Ok(LocationRow {
        record: DeathRecord::new(player, world, row.try_get(5)?, row.try_get(6)?, row.try_get(7)?),
        world_name,
    })
}

/// Insert or replace one row keyed by the four uid columns.
pub async fn upsert_location<'e, E>(executor: E, row: &LocationRow) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let (p_msb, p_lsb) = row.record.player.to_parts();
    let (w_msb, w_lsb) = row.record.world.to_parts();

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO death_locations
            (player_uid_msb, player_uid_lsb, worldname,
             world_uid_msb, world_uid_lsb, x, y, z)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(p_msb)
    .bind(p_lsb)
    .bind(&row.world_name)
    .bind(w_msb)
    .bind(w_lsb)
    .bind(row.record.x)
    .bind(row.record.y)
    .bind(row.record.z)
    .execute(executor)
    .await?;

    Ok(())
}
