//! Death record value type and the identifiers it is keyed by.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stable identifier of a player, as assigned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(Uuid);

/// Stable identifier of a world, as assigned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldId(Uuid);

macro_rules! uuid_newtype {
    ($name:ident) => {
        impl $name {
            pub const fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Split into (most significant, least significant) halves as
            /// stored in the SQLite columns.
            pub fn to_parts(&self) -> (i64, i64) {
                let (msb, lsb) = self.0.as_u64_pair();
                (msb as i64, lsb as i64)
            }

            pub fn from_parts(msb: i64, lsb: i64) -> Self {
                Self(Uuid::from_u64_pair(msb as u64, lsb as u64))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.hyphenated())
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

uuid_newtype!(PlayerId);
uuid_newtype!(WorldId);

/// Composite key: at most one record exists per (player, world).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub player: PlayerId,
    pub world: WorldId,
}

impl RecordKey {
    pub fn new(player: PlayerId, world: WorldId) -> Self {
        Self { player, world }
    }
}

/// A player's last death position in one world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeathRecord {
    pub player: PlayerId,
    pub world: WorldId,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl DeathRecord {
    pub fn new(player: PlayerId, world: WorldId, x: f64, y: f64, z: f64) -> Self {
        Self {
            player,
            world,
            x,
            y,
            z,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.player, self.world)
    }

    /// Two records are the same logical record when their keys match,
    /// regardless of coordinates.
    pub fn same_key(&self, other: &DeathRecord) -> bool {
        self.key() == other.key()
    }

    pub fn coordinates(&self) -> (f64, f64, f64) {
        (self.x, self.y, self.z)
    }
}
