//! Battle phase: simultaneous combat losses for every tile in one tick.
//!
//! Reads tiles and live movements from the index; writes only tile armies.
//! No army changes place here, movements are left untouched.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::debug;

use crate::simulation::SimulationError;
use crate::simulation::index::StateIndex;
use crate::world::tile::{PlayerId, TileId};

/// Damage an attacking unit deals to the defenders of the tile it enters.
pub const ATTACK_TO_DEFENSE_EFFICIENCY: f64 = 0.2;
/// Damage an attacking unit deals to other attackers entering the same tile.
pub const ATTACK_TO_ATTACK_EFFICIENCY: f64 = 0.2;
/// Damage a defending unit deals to attackers entering its tile.
pub const DEFENSE_TO_ATTACK_EFFICIENCY: f64 = 0.25;

/// Absorbs float noise before flooring, so 2.9999999999 survivors stay 3.
const FLOOR_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BattleReport {
    /// Tiles entered by at least one party hostile to their owner.
    pub battlefields: usize,
    /// Army lost across all tiles.
    pub casualties: u64,
}

/// Working state of one battle phase. Amounts are fractional until the
/// final floor.
struct Battlefield {
    owners: HashMap<TileId, Option<PlayerId>>,
    armies: BTreeMap<TileId, f64>,
    /// What stayed home after dispatch, per tile.
    defending: BTreeMap<TileId, f64>,
    /// Attacking amounts keyed by entered tile, then source tile.
    attacks: BTreeMap<TileId, BTreeMap<TileId, f64>>,
    touched: BTreeSet<TileId>,
}

impl Battlefield {
    fn owner(&self, tile: TileId) -> Option<PlayerId> {
        self.owners.get(&tile).copied().flatten()
    }

    fn army(&self, tile: TileId) -> f64 {
        self.armies.get(&tile).copied().unwrap_or(0.0)
    }

    fn lose(&mut self, tile: TileId, amount: f64) {
        if let Some(army) = self.armies.get_mut(&tile) {
            *army -= amount.min(*army);
            self.touched.insert(tile);
        }
    }
}

/// Whole units left of a fractional army, never more than held before battle.
fn surviving_army(remaining: f64, before: u32) -> u32 {
    ((remaining + FLOOR_EPSILON).floor().max(0.0) as u32).min(before)
}

/// Resolve combat for every attacked tile.
pub fn resolve_battles(index: &mut StateIndex) -> Result<BattleReport, SimulationError> {
    let armies: BTreeMap<TileId, f64> = index.tiles().map(|t| (t.id, t.army as f64)).collect();
    let mut field = Battlefield {
        owners: index.tiles().map(|t| (t.id, t.owner)).collect(),
        defending: armies.clone(),
        armies,
        attacks: BTreeMap::new(),
        touched: BTreeSet::new(),
    };

    dispatch(index, &mut field)?;
    defender_losses(&mut field);
    attacker_losses(&mut field);

    let battlefields = field
        .attacks
        .iter()
        .filter(|(tile, parties)| {
            let defender = field.owner(**tile);
            parties.keys().any(|&source| field.owner(source) != defender)
        })
        .count();

    let mut casualties = 0u64;
    for &tile in &field.touched {
        let before = index.tile(tile).map(|t| t.army).unwrap_or(0);
        let after = surviving_army(field.army(tile), before);
        casualties += (before - after) as u64;
        index.set_tile_army(tile, after)?;
    }

    debug!(battlefields, casualties, "Battle phase resolved");
    Ok(BattleReport {
        battlefields,
        casualties,
    })
}

/// Every tile's army starts out defending. Each movement pulls its
/// proportional share out of its source's pool and sends it at the next hop.
fn dispatch(index: &mut StateIndex, field: &mut Battlefield) -> Result<(), SimulationError> {
    let movements: Vec<_> = index
        .live_movements()
        .map(|(key, m)| (key, m.source, m.next))
        .collect();

    for (key, source, next) in movements {
        let effective = index.effective_amount(key)? as f64;
        let Some(pool) = field.defending.get_mut(&source) else {
            continue;
        };
        let committed = effective.min(*pool);
        if committed <= 0.0 {
            continue;
        }
        *pool -= committed;
        *field
            .attacks
            .entry(next)
            .or_default()
            .entry(source)
            .or_insert(0.0) += committed;
    }
    Ok(())
}

/// Defenders fall to hostile attackers. Whatever part of the attacking
/// force was spent killing them is taken off the attacking parties.
fn defender_losses(field: &mut Battlefield) {
    let tiles: Vec<TileId> = field.attacks.keys().copied().collect();
    for tile in tiles {
        let defender = field.owner(tile);
        let hostile: Vec<TileId> = field.attacks[&tile]
            .keys()
            .copied()
            .filter(|&source| field.owner(source) != defender)
            .collect();
        let force = hostile
            .iter()
            .map(|source| field.attacks[&tile][source])
            .sum::<f64>()
            * ATTACK_TO_DEFENSE_EFFICIENCY;

        let losses = force.min(field.army(tile));
        if losses <= 0.0 {
            continue;
        }
        field.lose(tile, losses);

        let spent = losses / force;
        if let Some(parties) = field.attacks.get_mut(&tile) {
            for source in hostile {
                if let Some(amount) = parties.get_mut(&source) {
                    *amount -= *amount * spent;
                }
            }
        }
    }
}

/// Attacking parties fight every other side on the tile they enter:
/// other attackers, and the tile's own defenders when hostile to them.
fn attacker_losses(field: &mut Battlefield) {
    let mut deaths: Vec<(TileId, f64)> = Vec::new();

    for (&tile, parties) in &field.attacks {
        let defender = field.owner(tile);
        let mut by_owner: BTreeMap<Option<PlayerId>, f64> = BTreeMap::new();
        for (&source, &amount) in parties {
            *by_owner.entry(field.owner(source)).or_insert(0.0) += amount;
        }
        // Everyone on the tile except `side`.
        let opposing = |side: Option<PlayerId>| -> f64 {
            by_owner
                .iter()
                .filter(|(owner, _)| **owner != side)
                .map(|(_, amount)| amount)
                .sum()
        };
        let pool = field.defending.get(&tile).copied().unwrap_or(0.0);

        for (&source, &receiving) in parties {
            if receiving <= 0.0 {
                continue;
            }
            let attacker = field.owner(source);
            let mut dead = 0.0;

            for (&dealer, &dealing) in &by_owner {
                if dealer == attacker {
                    continue;
                }
                let against = opposing(dealer);
                if against > 0.0 {
                    dead += dealing * ATTACK_TO_ATTACK_EFFICIENCY * receiving / against;
                }
            }

            if attacker != defender {
                let against = opposing(defender);
                if against > 0.0 {
                    dead += pool * DEFENSE_TO_ATTACK_EFFICIENCY * receiving / against;
                }
            }

            if dead > 0.0 {
                deaths.push((source, dead));
            }
        }
    }

    for (source, dead) in deaths {
        field.lose(source, dead);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::board::generate_hexagonal_tiles;
    use crate::world::coords::Cube;
    use crate::world::tile::{Movement, Tile};

    /// Radius-2 board; `set` gives (x, y) -> (owner, army).
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

    fn run(tiles: Vec<Tile>, movements: &[(TileId, TileId, u32)]) -> (StateIndex, BattleReport) {
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
        let mut index = StateIndex::new(tiles, movements).unwrap();
        let report = resolve_battles(&mut index).unwrap();
        (index, report)
    }

    fn army(index: &StateIndex, tile: TileId) -> u32 {
        index.tile(tile).unwrap().army
    }

    #[test]
    fn reinforcements_fight_nobody() {
        let tiles = board(&[((0, 0), Some(1), 10), ((1, 0), Some(1), 10)]);
        let (a, b) = (at(&tiles, 0, 0), at(&tiles, 1, 0));
        let (index, report) = run(tiles, &[(a, b, 10), (b, a, 4)]);
        assert_eq!(army(&index, a), 10);
        assert_eq!(army(&index, b), 10);
        assert_eq!(report, BattleReport::default());
    }

    #[test]
    fn defenders_absorb_attack_until_force_is_spent() {
        let tiles = board(&[((0, 0), Some(1), 10), ((1, 0), Some(2), 10)]);
        let (t, s) = (at(&tiles, 0, 0), at(&tiles, 1, 0));
        let (index, report) = run(tiles, &[(s, t, 10)]);
        // force 2 fully spent on a 10-strong garrison, nothing left over
        assert_eq!(army(&index, t), 8);
        assert_eq!(army(&index, s), 10);
        assert_eq!(report.battlefields, 1);
        assert_eq!(report.casualties, 2);
    }

    #[test]
    fn surviving_attackers_take_fire_from_the_garrison() {
        let tiles = board(&[((0, 0), Some(1), 1), ((1, 0), Some(2), 100)]);
        let (t, s) = (at(&tiles, 0, 0), at(&tiles, 1, 0));
        let (index, report) = run(tiles, &[(s, t, 50)]);
        // force 10 kills the single defender; 45 attackers remain and the
        // garrison of 1 deals 0.25 back
        assert_eq!(army(&index, t), 0);
        assert_eq!(army(&index, s), 99);
        assert_eq!(report.casualties, 2);
    }

    #[test]
    fn rival_attackers_trade_losses() {
        let tiles = board(&[((1, 0), Some(1), 10), ((-1, 0), Some(2), 10)]);
        let (s1, s2, e) = (at(&tiles, 1, 0), at(&tiles, -1, 0), at(&tiles, 0, 0));
        let (index, report) = run(tiles, &[(s1, e, 5), (s2, e, 5)]);
        assert_eq!(army(&index, s1), 9);
        assert_eq!(army(&index, s2), 9);
        assert_eq!(army(&index, e), 0);
        assert_eq!(report.casualties, 2);
    }

    #[test]
    fn oversubscribed_source_splits_proportionally() {
        let tiles = board(&[
            ((0, 0), Some(1), 10),
            ((1, 0), Some(2), 100),
            ((-1, 0), Some(2), 100),
        ]);
        let (s, t1, t2) = (at(&tiles, 0, 0), at(&tiles, 1, 0), at(&tiles, -1, 0));
        // 20 committed from an army of 10: each order gets 5
        let (index, _) = run(tiles.clone(), &[(s, t1, 10), (s, t2, 10)]);
        assert_eq!(army(&index, t1), 99);
        assert_eq!(army(&index, t2), 99);

        let (reordered, _) = run(tiles, &[(s, t2, 10), (s, t1, 10)]);
        assert_eq!(army(&reordered, t1), 99);
        assert_eq!(army(&reordered, t2), 99);
    }

    #[test]
    fn no_movements_no_battle() {
        let tiles = board(&[((0, 0), Some(1), 10), ((1, 0), Some(2), 10)]);
        let (index, report) = run(tiles, &[]);
        assert_eq!(report, BattleReport::default());
        assert!(index.into_diff().tiles.is_empty());
    }

    #[test]
    fn survivors_round_down_but_ignore_float_noise() {
        assert_eq!(surviving_army(2.9999999999, 5), 3);
        assert_eq!(surviving_army(2.99, 5), 2);
        assert_eq!(surviving_army(7.5, 5), 5);
        assert_eq!(surviving_army(-0.5, 5), 0);
        // Two 0.2-efficiency hits of 1 and 4 units leave 2, not 1.9999999999999998.
        let remaining = 3.0 - ATTACK_TO_DEFENSE_EFFICIENCY - 4.0 * ATTACK_TO_DEFENSE_EFFICIENCY;
        assert!(remaining < 2.0);
        assert_eq!(surviving_army(remaining, 3), 2);
    }
}
