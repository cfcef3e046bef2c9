//! Movement phase: advance every movement one hex.
//!
//! Runs after ownership is final. Reads tiles and live movements; writes
//! tile armies and movement amounts, and synthesizes the onward movement
//! for armies that stop on an intermediate hex.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::simulation::SimulationError;
use crate::simulation::index::StateIndex;
use crate::world::tile::{Path, TileId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MovementReport {
    pub executed: usize,
    /// Movements that could not step this tick: no army behind them, or a
    /// next hop held by someone else.
    pub stalled: usize,
    pub army_moved: u64,
}

/// Move armies one hex along their paths, all at once.
///
/// Movements are visited in creation order. A source never sends more than
/// its army in total, so later movements from a drained tile stall. Amount
/// changes are collected per path and written after the pass, which makes
/// the movements synthesized here wait for the next tick.
pub fn execute_movements(index: &mut StateIndex) -> Result<MovementReport, SimulationError> {
    let snapshot: Vec<_> = index
        .live_movements()
        .map(|(_, m)| (m.source, m.target, m.next, m.amount))
        .collect();

    let mut report = MovementReport::default();
    let mut outgoing: BTreeMap<TileId, u64> = BTreeMap::new();
    let mut incoming: BTreeMap<TileId, u64> = BTreeMap::new();
    let mut path_deltas: BTreeMap<Path, i64> = BTreeMap::new();

    for (source, target, next, amount) in snapshot {
        let from = index
            .tile(source)
            .ok_or(SimulationError::UnknownTile(source))?;
        let to = index.tile(next).ok_or(SimulationError::UnknownTile(next))?;

        let already_out = outgoing.get(&source).copied().unwrap_or(0);
        let available = (from.army as u64).saturating_sub(already_out);
        let moved = (amount as u64).min(available);
        if moved == 0 || from.owner != to.owner {
            report.stalled += 1;
            continue;
        }

        *outgoing.entry(source).or_insert(0) += moved;
        *incoming.entry(next).or_insert(0) += moved;
        *path_deltas.entry((source, target)).or_insert(0) -= moved as i64;
        if next != target {
            *path_deltas.entry((next, target)).or_insert(0) += moved as i64;
        }
        report.executed += 1;
        report.army_moved += moved;
    }

    for (path, delta) in path_deltas {
        match index.movement_on_path(path) {
            Some(key) if delta != 0 => {
                index.update_movement_amount(key, delta)?;
            }
            Some(_) => {}
            None if delta > 0 => {
                let amount = u32::try_from(delta).map_err(|_| SimulationError::AmountOverflow)?;
                index.create_movement(path, amount)?;
            }
            None if delta < 0 => {
                return Err(SimulationError::MovementNotLive {
                    from: path.0,
                    to: path.1,
                });
            }
            None => {}
        }
    }

    let mut touched: Vec<TileId> = outgoing.keys().chain(incoming.keys()).copied().collect();
    touched.sort_unstable();
    touched.dedup();
    for tile in touched {
        let army = index.tile(tile).ok_or(SimulationError::UnknownTile(tile))?.army as u64;
        let after = army + incoming.get(&tile).copied().unwrap_or(0)
            - outgoing.get(&tile).copied().unwrap_or(0);
        let after = u32::try_from(after).map_err(|_| SimulationError::AmountOverflow)?;
        index.set_tile_army(tile, after)?;
    }

    debug!(
        executed = report.executed,
        stalled = report.stalled,
        army_moved = report.army_moved,
        "Movement phase resolved"
    );
    Ok(report)
}
