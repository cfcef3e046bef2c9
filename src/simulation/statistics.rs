use std::collections::BTreeMap;

use serde::Serialize;

use crate::simulation::battle::BattleReport;
use crate::simulation::diff::TickDiff;
use crate::simulation::movement::MovementReport;
use crate::simulation::ownership::OwnershipReport;
use crate::world::Game;
use crate::world::tile::PlayerId;

/// Tiles and army held by one side. `owner == None` is the unowned land.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerStanding {
    pub owner: Option<PlayerId>,
    pub tiles: u32,
    pub army: u64,
}

/// Per-tick aggregate metrics for introspection and stalemate detection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickStatistics {
    pub tick: u64,
    pub standings: Vec<OwnerStanding>,
    pub total_army: u64,
    pub movement_count: usize,
    pub tiles_written: usize,
    pub movements_created: usize,
    pub movements_updated: usize,
    pub movements_deleted: usize,
    pub conquests: usize,
    pub contested_tiles: usize,
    pub casualties: u64,
    pub army_moved: u64,
    pub tick_duration_ms: f32,
}

impl TickStatistics {
    /// Nothing fought, moved or changed hands.
    pub fn is_quiet(&self) -> bool {
        self.conquests == 0 && self.casualties == 0 && self.army_moved == 0
    }
}

/// Compute statistics for a game after its tick has been applied.
pub fn compute_statistics(
    game: &Game,
    diff: &TickDiff,
    battle: &BattleReport,
    ownership: &OwnershipReport,
    movement: &MovementReport,
    tick_duration_ms: f32,
) -> TickStatistics {
    let mut by_owner: BTreeMap<Option<PlayerId>, (u32, u64)> = BTreeMap::new();
    for tile in &game.tiles {
        let entry = by_owner.entry(tile.owner).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += tile.army as u64;
    }
    let standings: Vec<OwnerStanding> = by_owner
        .into_iter()
        .map(|(owner, (tiles, army))| OwnerStanding { owner, tiles, army })
        .collect();

    TickStatistics {
        tick: game.tick_count,
        total_army: standings.iter().map(|s| s.army).sum(),
        standings,
        movement_count: game.movements.len(),
        tiles_written: diff.tiles.len(),
        movements_created: diff.created.len(),
        movements_updated: diff.updated.len(),
        movements_deleted: diff.deleted.len(),
        conquests: ownership.conquered.len(),
        contested_tiles: ownership.contested.len(),
        casualties: battle.casualties,
        army_moved: movement.army_moved,
        tick_duration_ms,
    }
}
