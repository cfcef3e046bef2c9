use serde::{Deserialize, Serialize};

use crate::world::coords::Cube;

pub type TileId = u32;
pub type PlayerId = u32;
pub type MovementId = u64;

/// Ordered (source, target) pair. At most one movement exists per path.
pub type Path = (TileId, TileId);

// === Tile ===

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub id: TileId,
    pub coords: Cube,
    pub owner: Option<PlayerId>,
    pub army: u32,
}

impl Tile {
    /// An unowned, empty tile. Board generation creates every tile this way.
    pub fn new_unowned(id: TileId, coords: Cube) -> Self {
        Self {
            id,
            coords,
            owner: None,
            army: 0,
        }
    }
}

// === Movement ===

/// A standing order moving `amount` army from `source` towards `target`, one hex per tick.
/// The movement belongs to whoever owns `source` when a tick resolves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub source: TileId,
    pub target: TileId,
    pub amount: u32,
}

impl Movement {
    pub fn path(&self) -> Path {
        (self.source, self.target)
    }
}

// === Player ===

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
}
