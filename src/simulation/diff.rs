use serde::{Deserialize, Serialize};

use crate::world::tile::{MovementId, Tile, TileId};

/// A movement synthesized during a tick. The collaborator assigns its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovement {
    pub source: TileId,
    pub target: TileId,
    pub amount: u32,
}

/// A surviving movement whose amount changed during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementUpdate {
    pub id: MovementId,
    pub amount: u32,
}

/// Everything a tick changed, to be written back in one atomic step.
///
/// Tiles are full rows (owner and army) sorted by id; `deleted` is sorted too.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickDiff {
    pub tiles: Vec<Tile>,
    pub created: Vec<NewMovement>,
    pub updated: Vec<MovementUpdate>,
    pub deleted: Vec<MovementId>,
}

impl TickDiff {
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
            && self.created.is_empty()
            && self.updated.is_empty()
            && self.deleted.is_empty()
    }

    /// Number of rows the collaborator has to write.
    pub fn len(&self) -> usize {
        self.tiles.len() + self.created.len() + self.updated.len() + self.deleted.len()
    }
}
