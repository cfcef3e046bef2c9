pub mod board;
pub mod coords;
pub mod orders;
pub mod tile;

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::generation::GameParams;
use crate::simulation::SimulationError;
use crate::simulation::diff::TickDiff;
pub use coords::Cube;
pub use orders::OrderError;
pub use tile::{Movement, MovementId, Path, Player, PlayerId, Tile, TileId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: Uuid,
    pub name: String,
    pub created_at: String,
    pub tick_count: u64,
    pub radius: u32,
    pub params: GameParams,
    pub players: Vec<Player>,
    pub tiles: Vec<Tile>,
    pub movements: Vec<Movement>,
    pub next_movement_id: MovementId,
}

impl Game {
    /// Look up a tile by id. Boards store tile `n` at index `n`, so this is
    /// normally a direct index with a linear fallback.
    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        self.tile_index(id).map(|i| &self.tiles[i])
    }

    pub fn tile_at(&self, coords: Cube) -> Option<&Tile> {
        self.tiles.iter().find(|t| t.coords == coords)
    }

    fn tile_index(&self, id: TileId) -> Option<usize> {
        match self.tiles.get(id as usize) {
            Some(t) if t.id == id => Some(id as usize),
            _ => self.tiles.iter().position(|t| t.id == id),
        }
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_by_name(&self, name: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.name == name)
    }

    pub fn movement(&self, id: MovementId) -> Option<&Movement> {
        self.movements.iter().find(|m| m.id == id)
    }

    pub fn movement_on_path(&self, path: Path) -> Option<&Movement> {
        self.movements.iter().find(|m| m.path() == path)
    }

    pub fn outgoing_movements(&self, tile: TileId) -> impl Iterator<Item = &Movement> {
        self.movements.iter().filter(move |m| m.source == tile)
    }

    /// Total army held per owner, unowned tiles under `None`.
    pub fn army_by_owner(&self) -> BTreeMap<Option<PlayerId>, u64> {
        let mut totals = BTreeMap::new();
        for tile in &self.tiles {
            *totals.entry(tile.owner).or_insert(0) += tile.army as u64;
        }
        totals
    }

    pub(crate) fn allocate_movement_id(&mut self) -> MovementId {
        let id = self.next_movement_id;
        self.next_movement_id += 1;
        id
    }

    /// Write a tick's output set into this game.
    ///
    /// Deletions go first, then amount updates, then inserts (which receive
    /// fresh ids) and finally tile upserts. On error the game may be partly
    /// written; callers apply diffs to a copy they can discard.
    pub fn apply_diff(&mut self, diff: &TickDiff) -> Result<(), SimulationError> {
        let deleted: HashSet<MovementId> = diff.deleted.iter().copied().collect();
        for id in &deleted {
            if self.movement(*id).is_none() {
                return Err(SimulationError::UnknownMovement(*id));
            }
        }
        self.movements.retain(|m| !deleted.contains(&m.id));

        let positions: HashMap<MovementId, usize> = self
            .movements
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id, i))
            .collect();
        for update in &diff.updated {
            let i = positions
                .get(&update.id)
                .copied()
                .ok_or(SimulationError::UnknownMovement(update.id))?;
            self.movements[i].amount = update.amount;
        }

        for new in &diff.created {
            let id = self.allocate_movement_id();
            self.movements.push(Movement {
                id,
                source: new.source,
                target: new.target,
                amount: new.amount,
            });
        }

        for tile in &diff.tiles {
            let i = self
                .tile_index(tile.id)
                .ok_or(SimulationError::UnknownTile(tile.id))?;
            self.tiles[i].owner = tile.owner;
            self.tiles[i].army = tile.army;
        }

        Ok(())
    }

    /// Register a player and grant their starting tiles.
    ///
    /// Returns the new player's id and the granted tile ids; the grant is
    /// empty when no free tiles remain.
    pub fn add_player(&mut self, name: &str) -> Result<(PlayerId, Vec<TileId>), OrderError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(OrderError::EmptyPlayerName);
        }
        if self.player_by_name(name).is_some() {
            return Err(OrderError::DuplicatePlayer(name.to_string()));
        }
        let id = self.players.iter().map(|p| p.id).max().unwrap_or(0) + 1;
        self.players.push(Player {
            id,
            name: name.to_string(),
        });
        let tile_count = self.params.initial_tile_count;
        let army = self.params.initial_army;
        let granted = board::grant_initial_tiles(self, id, tile_count, army);
        Ok((id, granted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::diff::{MovementUpdate, NewMovement};
    use crate::world::board::generate_game;

    fn small_game() -> Game {
        let params = GameParams {
            seed: 11,
            radius: 2,
            ..GameParams::default()
        };
        generate_game(&params).unwrap()
    }

    #[test]
    fn tile_lookup_by_id_and_coords() {
        let game = small_game();
        let origin = game.tile_at(Cube::ORIGIN).unwrap();
        assert_eq!(game.tile(origin.id).unwrap().coords, Cube::ORIGIN);
        assert!(game.tile(10_000).is_none());
        assert!(game.tile_at(Cube::from_xy(5, 0)).is_none());
    }

    #[test]
    fn apply_diff_assigns_ids_and_writes_tiles() {
        let mut game = small_game();
        game.movements.push(Movement {
            id: 1,
            source: 0,
            target: 2,
            amount: 4,
        });
        game.movements.push(Movement {
            id: 2,
            source: 1,
            target: 3,
            amount: 6,
        });
        game.next_movement_id = 3;

        let mut tile = game.tiles[5].clone();
        tile.owner = Some(1);
        tile.army = 9;
        let diff = TickDiff {
            tiles: vec![tile],
            created: vec![NewMovement {
                source: 4,
                target: 2,
                amount: 3,
            }],
            updated: vec![MovementUpdate { id: 2, amount: 1 }],
            deleted: vec![1],
        };
        game.apply_diff(&diff).unwrap();

        assert!(game.movement(1).is_none());
        assert_eq!(game.movement(2).unwrap().amount, 1);
        let created = game.movement(3).unwrap();
        assert_eq!(created.path(), (4, 2));
        assert_eq!(created.amount, 3);
        assert_eq!(game.next_movement_id, 4);
        assert_eq!(game.tiles[5].owner, Some(1));
        assert_eq!(game.tiles[5].army, 9);
    }

    #[test]
    fn apply_diff_rejects_unknown_movement() {
        let mut game = small_game();
        let diff = TickDiff {
            deleted: vec![99],
            ..TickDiff::default()
        };
        assert!(matches!(
            game.apply_diff(&diff),
            Err(SimulationError::UnknownMovement(99))
        ));
    }

    #[test]
    fn add_player_grants_tiles_and_rejects_duplicates() {
        let mut game = small_game();
        let (id, granted) = game.add_player("red").unwrap();
        assert_eq!(id, 1);
        assert_eq!(granted.len(), 10);
        for tile_id in &granted {
            let tile = game.tile(*tile_id).unwrap();
            assert_eq!(tile.owner, Some(1));
            assert_eq!(tile.army, 10);
        }
        assert_eq!(
            game.add_player("red").unwrap_err(),
            OrderError::DuplicatePlayer("red".to_string())
        );
        assert_eq!(game.add_player("  ").unwrap_err(), OrderError::EmptyPlayerName);
    }

    #[test]
    fn army_by_owner_groups_unowned_tiles() {
        let mut game = small_game();
        game.tiles[0].army = 5;
        game.tiles[1].owner = Some(2);
        game.tiles[1].army = 7;
        game.tiles[2].owner = Some(2);
        game.tiles[2].army = 1;
        let totals = game.army_by_owner();
        assert_eq!(totals[&None], 5);
        assert_eq!(totals[&Some(2)], 8);
    }
}
