//! Ownership phase: settle who holds each tile armies are about to enter.
//!
//! Reads post-battle armies and live movements; writes tile owners and,
//! through [`StateIndex::update_tile_owner`], deletes the outgoing
//! movements of every tile that changes hands.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::simulation::SimulationError;
use crate::simulation::index::StateIndex;
use crate::world::tile::{PlayerId, TileId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Conquest {
    pub tile: TileId,
    pub previous: Option<PlayerId>,
    pub owner: Option<PlayerId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OwnershipReport {
    pub conquered: Vec<Conquest>,
    /// Next-hop tiles where more than one side is present.
    pub contested: Vec<TileId>,
}

/// A tile goes to the only side present on it: its own garrison if any
/// army is left, plus every movement that can actually deliver army this
/// tick. Two or more sides leave the tile as it is.
pub fn resolve_ownership(index: &mut StateIndex) -> Result<OwnershipReport, SimulationError> {
    let mut report = OwnershipReport::default();

    for (tile_id, keys) in index.next_hop_groups() {
        let tile = index
            .tile(tile_id)
            .ok_or(SimulationError::UnknownTile(tile_id))?;
        let (previous, army) = (tile.owner, tile.army);

        let mut sides: BTreeSet<Option<PlayerId>> = BTreeSet::new();
        if army > 0 {
            sides.insert(previous);
        }
        for key in keys {
            // An earlier conquest may have cancelled it.
            if !index.is_live(key) {
                continue;
            }
            if index.effective_amount(key)? > 0 {
                sides.insert(index.movement_owner(key)?);
            }
        }

        match sides.len() {
            0 => {}
            1 => {
                let owner = sides.first().copied().flatten();
                if index.update_tile_owner(tile_id, owner)? {
                    info!(tile = tile_id, ?previous, ?owner, "Tile conquered");
                    report.conquered.push(Conquest {
                        tile: tile_id,
                        previous,
                        owner,
                    });
                }
            }
            _ => report.contested.push(tile_id),
        }
    }

    debug!(
        conquered = report.conquered.len(),
        contested = report.contested.len(),
        "Ownership phase resolved"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::board::generate_hexagonal_tiles;
    use crate::world::coords::Cube;
    use crate::world::tile::{Movement, Tile};

    fn board(set: &[((i32, i32), Option<PlayerId>, u32)]) -> Vec<Tile> {
        let mut tiles = generate_hexagonal_tiles(2);
        for &((x, y), owner, army) in set {
            let tile = tiles
                .iter_mut()
                .find(|t| t.coords == Cube::from_xy(x, y))
                .unwrap();
            tile.owner = owner;
            tile.army = army;
        }
        tiles
    }

    fn at(tiles: &[Tile], x: i32, y: i32) -> TileId {
        tiles
            .iter()
            .find(|t| t.coords == Cube::from_xy(x, y))
            .unwrap()
            .id
    }

    fn index(tiles: Vec<Tile>, movements: &[(TileId, TileId, u32)]) -> StateIndex {
        let movements = movements
            .iter()
            .enumerate()
            .map(|(i, &(source, target, amount))| Movement {
                id: i as u64 + 1,
                source,
                target,
                amount,
            })
            .collect();
        StateIndex::new(tiles, movements).unwrap()
    }

    #[test]
    fn single_side_takes_empty_tile() {
        let tiles = board(&[((0, 0), Some(1), 5)]);
        let (a, b) = (at(&tiles, 0, 0), at(&tiles, 1, 0));
        let mut index = index(tiles, &[(a, b, 3)]);
        let report = resolve_ownership(&mut index).unwrap();
        assert_eq!(
            report.conquered,
            vec![Conquest {
                tile: b,
                previous: None,
                owner: Some(1)
            }]
        );
        assert_eq!(index.tile(b).unwrap().owner, Some(1));
    }

    #[test]
    fn garrison_holds_against_arrivals() {
        let tiles = board(&[((0, 0), Some(1), 5), ((1, 0), Some(2), 1)]);
        let (a, b) = (at(&tiles, 0, 0), at(&tiles, 1, 0));
        let mut index = index(tiles, &[(a, b, 3)]);
        let report = resolve_ownership(&mut index).unwrap();
        assert!(report.conquered.is_empty());
        assert_eq!(report.contested, vec![b]);
        assert_eq!(index.tile(b).unwrap().owner, Some(2));
    }

    #[test]
    fn wiped_out_garrison_loses_tile_and_orders() {
        let tiles = board(&[((0, 0), Some(1), 5), ((1, 0), Some(2), 0), ((2, 0), Some(2), 4)]);
        let (a, b, c) = (at(&tiles, 0, 0), at(&tiles, 1, 0), at(&tiles, 2, 0));
        // b is empty; its own order towards c goes with it
        let mut index = index(tiles, &[(a, b, 3), (b, c, 1)]);
        let report = resolve_ownership(&mut index).unwrap();
        assert_eq!(report.conquered.len(), 1);
        assert_eq!(index.tile(b).unwrap().owner, Some(1));
        assert_eq!(index.movement_on_path((b, c)), None);
        assert_eq!(index.into_diff().deleted, vec![2]);
    }

    #[test]
    fn unbacked_orders_do_not_count() {
        // a has no army, so its order delivers nothing
        let tiles = board(&[((0, 0), Some(1), 0)]);
        let (a, b) = (at(&tiles, 0, 0), at(&tiles, 1, 0));
        let mut index = index(tiles, &[(a, b, 3)]);
        let report = resolve_ownership(&mut index).unwrap();
        assert_eq!(report, OwnershipReport::default());
        assert_eq!(index.tile(b).unwrap().owner, None);
    }

    #[test]
    fn rival_arrivals_contest_tile() {
        let tiles = board(&[((1, 0), Some(1), 5), ((-1, 0), Some(2), 5)]);
        let (s1, s2, e) = (at(&tiles, 1, 0), at(&tiles, -1, 0), at(&tiles, 0, 0));
        let mut index = index(tiles, &[(s1, e, 2), (s2, e, 2)]);
        let report = resolve_ownership(&mut index).unwrap();
        assert_eq!(report.contested, vec![e]);
        assert_eq!(index.tile(e).unwrap().owner, None);
    }
}
