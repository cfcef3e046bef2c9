pub mod battle;
pub mod diff;
pub mod index;
pub mod movement;
pub mod ownership;
pub mod statistics;

use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info};

use crate::simulation::battle::BattleReport;
use crate::simulation::diff::TickDiff;
use crate::simulation::index::{MovementKey, StateIndex};
use crate::simulation::movement::MovementReport;
use crate::simulation::ownership::OwnershipReport;
use crate::simulation::statistics::TickStatistics;
use crate::world::Game;
use crate::world::coords::{CoordError, Cube};
use crate::world::tile::{Movement, MovementId, Tile, TileId};

/// Invariant violations. Any of these means a bug in the engine or a
/// corrupt snapshot, never bad player input; the tick is abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    #[error("tile {0} appears more than once")]
    DuplicateTile(TileId),
    #[error("more than one tile at {0}")]
    DuplicateCoordinates(Cube),
    #[error(transparent)]
    InvalidCoordinates(#[from] CoordError),
    #[error("unknown tile {0}")]
    UnknownTile(TileId),
    #[error("path leaves the board at {0}")]
    NoTileAt(Cube),
    #[error("movement {0} appears more than once")]
    DuplicateMovement(MovementId),
    #[error("unknown movement {0}")]
    UnknownMovement(MovementId),
    #[error("movement {0} has no amount or goes nowhere")]
    DegenerateMovement(MovementId),
    #[error("cannot create an empty movement from tile {from} to tile {to}")]
    EmptyMovement { from: TileId, to: TileId },
    #[error("a movement from tile {from} to tile {to} already exists")]
    DuplicatePath { from: TileId, to: TileId },
    #[error("movement from tile {from} to tile {to} was already deleted")]
    PathAlreadyDeleted { from: TileId, to: TileId },
    #[error("no live movement from tile {from} to tile {to}")]
    MovementNotLive { from: TileId, to: TileId },
    #[error("movement key {0} was never allocated")]
    StaleMovementKey(MovementKey),
    #[error("army or movement amount overflowed")]
    AmountOverflow,
}

/// Everything one pass of the engine produced.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub diff: TickDiff,
    pub battle: BattleReport,
    pub ownership: OwnershipReport,
    pub movement: MovementReport,
    /// Phase timings in ms: [Battle, Ownership, Movement]
    pub phase_timings_ms: [f32; 3],
}

/// Run battle, ownership and movement over one game snapshot.
pub fn resolve_tick(
    tiles: Vec<Tile>,
    movements: Vec<Movement>,
) -> Result<TickOutcome, SimulationError> {
    let mut index = StateIndex::new(tiles, movements)?;
    let mut phase_timings = [0.0_f32; 3];

    let start = Instant::now();
    let battle = battle::resolve_battles(&mut index)?;
    phase_timings[0] = start.elapsed().as_secs_f32() * 1000.0;

    let start = Instant::now();
    let ownership = ownership::resolve_ownership(&mut index)?;
    phase_timings[1] = start.elapsed().as_secs_f32() * 1000.0;

    let start = Instant::now();
    let movement = movement::execute_movements(&mut index)?;
    phase_timings[2] = start.elapsed().as_secs_f32() * 1000.0;

    Ok(TickOutcome {
        diff: index.into_diff(),
        battle,
        ownership,
        movement,
        phase_timings_ms: phase_timings,
    })
}

/// The tick engine proper: same snapshot in, same diff out.
pub fn simulate(tiles: Vec<Tile>, movements: Vec<Movement>) -> Result<TickDiff, SimulationError> {
    resolve_tick(tiles, movements).map(|outcome| outcome.diff)
}

/// Result of executing a single tick.
#[derive(Debug, Clone)]
pub struct TickResult {
    pub statistics: TickStatistics,
    pub diff: TickDiff,
    /// Phase timings in ms: [Battle, Ownership, Movement, Statistics]
    pub phase_timings_ms: [f32; 4],
}

/// Execute a single tick on the game.
///
/// The diff is applied to a copy which replaces the game only once it has
/// been written completely, so on error the game is exactly as it was.
pub fn execute_tick(game: &mut Game) -> Result<TickResult, SimulationError> {
    let tick_start = Instant::now();

    let outcome = resolve_tick(game.tiles.clone(), game.movements.clone())?;
    let mut next = game.clone();
    next.apply_diff(&outcome.diff)?;
    next.tick_count += 1;
    *game = next;

    let mut phase_timings = [0.0_f32; 4];
    phase_timings[..3].copy_from_slice(&outcome.phase_timings_ms);

    let stats_start = Instant::now();
    let tick_duration = tick_start.elapsed().as_secs_f32() * 1000.0;
    let statistics = statistics::compute_statistics(
        game,
        &outcome.diff,
        &outcome.battle,
        &outcome.ownership,
        &outcome.movement,
        tick_duration,
    );
    phase_timings[3] = stats_start.elapsed().as_secs_f32() * 1000.0;

    debug!(
        game = %game.id,
        rows = outcome.diff.len(),
        tiles_written = statistics.tiles_written,
        created = statistics.movements_created,
        updated = statistics.movements_updated,
        deleted = statistics.movements_deleted,
        battle_ms = phase_timings[0],
        ownership_ms = phase_timings[1],
        movement_ms = phase_timings[2],
        statistics_ms = phase_timings[3],
        "Tick diff applied"
    );
    if !statistics.is_quiet() {
        info!(
            game = %game.id,
            tick = statistics.tick,
            conquests = statistics.conquests,
            casualties = statistics.casualties,
            army_moved = statistics.army_moved,
            "Tick resolved"
        );
    }

    Ok(TickResult {
        statistics,
        diff: outcome.diff,
        phase_timings_ms: phase_timings,
    })
}
