use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::generation::GameParams;
use crate::config::simulation::SimulationConfig;
use crate::persistence::{self, GameStore, RunLock};
use crate::simulation;
use crate::world::board::{generate_game, print_game_summary};
use crate::world::coords::Cube;
use crate::world::tile::{MovementId, PlayerId};
use crate::world::Game;

/// Pick the game a command works on: the one named, or the only one there is.
fn resolve_game_id(root: &Path, requested: Option<&str>) -> Result<Uuid, String> {
    if let Some(raw) = requested {
        let id = Uuid::parse_str(raw).map_err(|e| format!("Invalid game id '{}': {}", raw, e))?;
        if !persistence::game_directory(root, id).is_dir() {
            return Err(format!("Game {} not found in {}", id, root.display()));
        }
        return Ok(id);
    }

    let ids = persistence::list_games(root).map_err(|e| format!("Cannot list games: {}", e))?;
    match ids.as_slice() {
        [] => Err(format!(
            "No games found in {}. Create one with: hexfront new-game",
            root.display()
        )),
        [only] => Ok(*only),
        _ => Err(format!(
            "{} games found in {}; choose one with --game <ID>",
            ids.len(),
            root.display()
        )),
    }
}

fn load_game(config: &SimulationConfig, requested: Option<&str>) -> Result<Game, String> {
    let root = Path::new(&config.snapshot_directory);
    let id = resolve_game_id(root, requested)?;
    persistence::load_latest_valid_snapshot(&persistence::game_directory(root, id))
        .map_err(|e| format!("Failed to load game {}: {}", id, e))
}

fn save_game(config: &SimulationConfig, game: &Game) -> Result<PathBuf, String> {
    let dir = persistence::game_directory(Path::new(&config.snapshot_directory), game.id);
    let path = persistence::save_snapshot(game, &dir)
        .map_err(|e| format!("Cannot save snapshot: {}", e))?;
    if let Err(e) = persistence::prune_snapshots(&dir, config.max_snapshots as usize) {
        warn!(error = %e, "Snapshot pruning failed");
    }
    Ok(path)
}

/// Load a game, change it and store the result. Refused while `run` holds
/// the snapshot root.
fn update_game<T>(
    config: &SimulationConfig,
    requested: Option<&str>,
    change: impl FnOnce(&mut Game) -> Result<T, String>,
) -> Result<(T, PathBuf), String> {
    let root = Path::new(&config.snapshot_directory);
    persistence::ensure_unlocked(root).map_err(|e| e.to_string())?;
    let mut game = load_game(config, requested)?;
    let value = change(&mut game)?;
    persistence::ensure_unlocked(root).map_err(|e| e.to_string())?;
    let path = save_game(config, &game)?;
    Ok((value, path))
}

fn player_id(game: &Game, name: &str) -> Result<PlayerId, String> {
    game.player_by_name(name)
        .map(|p| p.id)
        .ok_or_else(|| format!("No player named '{}' in game {}", name, game.id))
}

fn owner_name(game: &Game, owner: Option<PlayerId>) -> String {
    match owner {
        Some(id) => game
            .player(id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| format!("#{}", id)),
        None => "(unowned)".to_string(),
    }
}

/// Create a game, print it and store its first snapshot.
pub fn new_game(config: &SimulationConfig, params: &GameParams) -> Result<Uuid, String> {
    let game = generate_game(params)?;
    print_game_summary(&game);
    let path = save_game(config, &game)?;
    println!("\nGame saved to {}", path.display());
    Ok(game.id)
}

/// Seat a new player and hand out their starting tiles.
pub fn join(config: &SimulationConfig, game: Option<&str>, name: &str) -> Result<(), String> {
    let ((id, granted), _) = update_game(config, game, |game| {
        game.add_player(name).map_err(|e| e.to_string())
    })?;
    if granted.is_empty() {
        warn!(player = id, "No free tiles left to grant");
    }
    println!(
        "Player '{}' joined as #{} with {} tile(s)",
        name.trim(),
        id,
        granted.len()
    );
    Ok(())
}

/// Order army from one hex towards another.
pub fn order(
    config: &SimulationConfig,
    game: Option<&str>,
    player: &str,
    from: Cube,
    to: Cube,
    amount: u32,
) -> Result<MovementId, String> {
    let (id, _) = update_game(config, game, |game| {
        let player = player_id(game, player)?;
        game.issue_movement_between(player, from, to, amount)
            .map_err(|e| e.to_string())
    })?;
    println!("Movement {} ordered: {} -> {} ({} army)", id, from, to, amount);
    Ok(id)
}

/// Change the amount of a standing movement.
pub fn amend(
    config: &SimulationConfig,
    game: Option<&str>,
    player: &str,
    movement: MovementId,
    amount: u32,
) -> Result<(), String> {
    update_game(config, game, |game| {
        let player = player_id(game, player)?;
        game.update_movement(player, movement, amount)
            .map_err(|e| e.to_string())
    })?;
    println!("Movement {} now carries {} army", movement, amount);
    Ok(())
}

/// Withdraw a standing movement.
pub fn cancel(
    config: &SimulationConfig,
    game: Option<&str>,
    player: &str,
    movement: MovementId,
) -> Result<(), String> {
    let (cancelled, _) = update_game(config, game, |game| {
        let player = player_id(game, player)?;
        game.cancel_movement(player, movement)
            .map_err(|e| e.to_string())
    })?;
    println!(
        "Movement {} cancelled ({} army from tile {} to tile {})",
        cancelled.id, cancelled.amount, cancelled.source, cancelled.target
    );
    Ok(())
}

/// Run `count` ticks on one game and store the result.
pub fn tick(
    config: &SimulationConfig,
    game: Option<&str>,
    count: u32,
    json: bool,
) -> Result<(), String> {
    let ((), path) = update_game(config, game, |game| {
        for _ in 0..count {
            let result = simulation::execute_tick(game)
                .map_err(|e| format!("Tick {} failed: {}", game.tick_count + 1, e))?;
            let stats = &result.statistics;
            if json {
                let line = serde_json::to_string(stats)
                    .map_err(|e| format!("Cannot encode statistics: {}", e))?;
                println!("{}", line);
            } else {
                println!(
                    "Tick {} | army {} | moved {} | casualties {} | conquests {} | contested {} | movements {} | {:.2}ms",
                    stats.tick,
                    stats.total_army,
                    stats.army_moved,
                    stats.casualties,
                    stats.conquests,
                    stats.contested_tiles,
                    stats.movement_count,
                    stats.tick_duration_ms
                );
            }
        }
        Ok(())
    })?;
    if !json {
        println!("Snapshot saved: {}", path.display());
    }
    Ok(())
}

/// Run every stored game at the configured tick rate until interrupted.
pub async fn run_simulation(config: &SimulationConfig) -> Result<(), String> {
    let root = PathBuf::from(&config.snapshot_directory);
    // Held until this function returns; player commands are refused meanwhile.
    let _lock = RunLock::acquire(&root).map_err(|e| e.to_string())?;
    let store = GameStore::load(&root, config.worker_threads)
        .map_err(|e| format!("Failed to load games: {}", e))?;
    let store = Arc::new(store);
    if store.is_empty() {
        return Err(format!(
            "No games found in {}. Create one with: hexfront new-game",
            root.display()
        ));
    }

    info!(
        games = store.len(),
        tick_rate_hz = config.tick_rate_hz,
        snapshot_interval = config.snapshot_interval,
        "Simulation running"
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let tick_interval = Duration::from_secs_f32(1.0 / config.tick_rate_hz);
    let mut ticks_since_snapshot: u32 = 0;
    let mut rounds: u64 = 0;

    loop {
        let round_start = std::time::Instant::now();

        // Ticks are CPU-bound; keep them off the async runtime.
        let worker = Arc::clone(&store);
        let results = tokio::task::spawn_blocking(move || worker.simulate_all())
            .await
            .map_err(|e| format!("Tick worker panicked: {}", e))?;

        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        if failed > 0 {
            warn!(failed, "Some games failed to tick and were left unchanged");
        }
        rounds += 1;

        ticks_since_snapshot += 1;
        if ticks_since_snapshot >= config.snapshot_interval {
            save_all(&store, &root, config.max_snapshots as usize);
            ticks_since_snapshot = 0;
        }

        if rounds % 100 == 0 {
            let moved: u64 = results
                .iter()
                .filter_map(|(_, r)| r.as_ref().ok())
                .map(|r| r.statistics.army_moved)
                .sum();
            info!(rounds, games = store.len(), army_moved = moved, "Tick milestone");
        }

        // Sleep off the rest of the interval; over budget, only poll for shutdown.
        let elapsed = round_start.elapsed();
        if elapsed < tick_interval {
            tokio::select! {
                _ = tokio::time::sleep(tick_interval - elapsed) => {}
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    save_all(&store, &root, config.max_snapshots as usize);
                    break;
                }
            }
        } else {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    save_all(&store, &root, config.max_snapshots as usize);
                    break;
                }
                _ = tokio::task::yield_now() => {}
            }
        }
    }

    info!(rounds, "Simulation stopped");
    Ok(())
}

fn save_all(store: &GameStore, root: &Path, max_snapshots: usize) {
    for id in store.ids() {
        if let Err(e) = store.save(id, root, max_snapshots) {
            error!(game = %id, error = %e, "Snapshot save failed");
        }
    }
}

/// Inspect a tile, a player or the game summary from the latest snapshot.
pub fn inspect(
    config: &SimulationConfig,
    game: Option<&str>,
    tile: Option<Cube>,
    player: Option<&str>,
    show_game: bool,
) -> Result<(), String> {
    let game = load_game(config, game)?;

    if let Some(coords) = tile {
        inspect_tile(&game, coords)
    } else if let Some(name) = player {
        inspect_player(&game, name)
    } else if show_game {
        print_game_summary(&game);
        inspect_movements(&game);
        Ok(())
    } else {
        Err("Specify --tile <X,Y,Z>, --player <NAME> or --summary".to_string())
    }
}

fn inspect_player(game: &Game, name: &str) -> Result<(), String> {
    let id = player_id(game, name)?;
    let (tiles, army) = game
        .tiles
        .iter()
        .filter(|t| t.owner == Some(id))
        .fold((0usize, 0u64), |(n, army), t| (n + 1, army + t.army as u64));

    println!("=== Player #{} '{}' ===", id, name);
    println!("Tiles: {}", tiles);
    println!("Army: {}", army);
    println!();

    println!("--- Movements ---");
    let movements = game.movements_of(id);
    if movements.is_empty() {
        println!("  (none)");
    }
    for m in movements {
        let (Some(source), Some(target)) = (game.tile(m.source), game.tile(m.target)) else {
            continue;
        };
        println!(
            "  #{:<6} ({}) -> ({}) {:>8} army, {} hex(es) to go",
            m.id,
            source.coords,
            target.coords,
            m.amount,
            source.coords.distance(target.coords)
        );
    }
    Ok(())
}

fn inspect_tile(game: &Game, coords: Cube) -> Result<(), String> {
    let tile = game
        .tile_at(coords)
        .ok_or_else(|| format!("No tile at {} (board radius {})", coords, game.radius))?;

    println!("=== Tile {} ({}) ===", tile.id, tile.coords);
    println!("Owner: {}", owner_name(game, tile.owner));
    println!("Army: {}", tile.army);
    println!();

    println!("--- Outgoing ---");
    let mut any = false;
    for m in game.outgoing_movements(tile.id) {
        any = true;
        let target = game.tile(m.target).map(|t| t.coords.to_string()).unwrap_or_default();
        println!("  #{:<6} -> ({}) {:>8} army", m.id, target, m.amount);
    }
    if !any {
        println!("  (none)");
    }

    println!("--- Incoming ---");
    let mut any = false;
    for m in game.movements.iter().filter(|m| m.target == tile.id) {
        any = true;
        let source = game.tile(m.source).map(|t| t.coords.to_string()).unwrap_or_default();
        println!("  #{:<6} <- ({}) {:>8} army", m.id, source, m.amount);
    }
    if !any {
        println!("  (none)");
    }

    Ok(())
}

fn inspect_movements(game: &Game) {
    if game.movements.is_empty() {
        return;
    }
    println!("\n--- Movements ---");
    for m in &game.movements {
        let (Some(source), Some(target)) = (game.tile(m.source), game.tile(m.target)) else {
            continue;
        };
        println!(
            "  #{:<6} {:<16} ({}) -> ({}) {:>8} army, {} hex(es) to go",
            m.id,
            owner_name(game, source.owner),
            source.coords,
            target.coords,
            m.amount,
            source.coords.distance(target.coords)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> SimulationConfig {
        SimulationConfig {
            snapshot_directory: dir.path().display().to_string(),
            max_snapshots: 3,
            ..SimulationConfig::default()
        }
    }

    fn params() -> GameParams {
        GameParams {
            seed: 21,
            radius: 3,
            initial_tile_count: 3,
            initial_army: 12,
            players: vec!["red".to_string()],
        }
    }

    #[test]
    fn new_game_then_join_and_order() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let id = new_game(&config, &params()).unwrap();
        join(&config, None, "blue").unwrap();

        let game = load_game(&config, Some(&id.to_string())).unwrap();
        assert_eq!(game.players.len(), 2);

        let from = game.tile_at(Cube::ORIGIN).unwrap().coords;
        let to = game
            .tiles
            .iter()
            .find(|t| t.owner == Some(2))
            .unwrap()
            .coords;
        let movement = order(&config, None, "red", from, to, 5).unwrap();
        amend(&config, None, "red", movement, 4).unwrap();
        let game = load_game(&config, None).unwrap();
        assert_eq!(game.movement(movement).unwrap().amount, 4);

        assert!(order(&config, None, "nobody", from, to, 5).is_err());
        assert!(cancel(&config, None, "blue", movement).is_err());
        cancel(&config, None, "red", movement).unwrap();
        assert!(load_game(&config, None).unwrap().movements.is_empty());
    }

    #[test]
    fn tick_advances_saved_game() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        new_game(&config, &params()).unwrap();
        tick(&config, None, 3, true).unwrap();
        assert_eq!(load_game(&config, None).unwrap().tick_count, 3);
    }

    #[test]
    fn game_selection_needs_an_id_when_ambiguous() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        assert!(load_game(&config, None).unwrap_err().contains("No games found"));

        let first = new_game(&config, &params()).unwrap();
        new_game(
            &config,
            &GameParams {
                seed: 22,
                ..params()
            },
        )
        .unwrap();
        assert!(load_game(&config, None).unwrap_err().contains("--game"));
        assert_eq!(load_game(&config, Some(&first.to_string())).unwrap().id, first);
        assert!(load_game(&config, Some("not-a-uuid")).is_err());
    }

    #[test]
    fn inspect_requires_a_target() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        new_game(&config, &params()).unwrap();
        assert!(inspect(&config, None, None, None, false).is_err());
        assert!(inspect(&config, None, Some(Cube::ORIGIN), None, false).is_ok());
        assert!(inspect(&config, None, Some(Cube::from_xy(9, 0)), None, false).is_err());
        assert!(inspect(&config, None, None, None, true).is_ok());
    }

    #[test]
    fn inspect_lists_a_players_movements() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        new_game(&config, &params()).unwrap();
        order(&config, None, "red", Cube::ORIGIN, Cube::from_xy(2, 0), 4).unwrap();

        let game = load_game(&config, None).unwrap();
        assert_eq!(game.movements_of(1).len(), 1);
        assert!(inspect(&config, None, None, Some("red"), false).is_ok());
        let err = inspect(&config, None, None, Some("nobody"), false).unwrap_err();
        assert!(err.contains("'nobody'"), "Error: {}", err);
    }

    #[test]
    fn commands_are_refused_while_run_holds_the_games() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        new_game(&config, &params()).unwrap();

        let lock = RunLock::acquire(dir.path()).unwrap();
        let err = order(&config, None, "red", Cube::ORIGIN, Cube::from_xy(2, 0), 5).unwrap_err();
        assert!(err.contains("running"), "Error: {}", err);
        assert!(join(&config, None, "blue").is_err());
        assert!(amend(&config, None, "red", 1, 2).is_err());
        assert!(cancel(&config, None, "red", 1).is_err());
        assert!(tick(&config, None, 1, true).is_err());
        assert!(inspect(&config, None, None, None, true).is_ok());

        let game = load_game(&config, None).unwrap();
        assert!(game.movements.is_empty());
        assert_eq!(game.players.len(), 1);
        assert_eq!(game.tick_count, 0);

        drop(lock);
        let movement = order(&config, None, "red", Cube::ORIGIN, Cube::from_xy(2, 0), 5).unwrap();
        assert!(load_game(&config, None).unwrap().movement(movement).is_some());
    }

    #[tokio::test]
    async fn second_run_is_refused() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        new_game(&config, &params()).unwrap();

        let lock = RunLock::acquire(dir.path()).unwrap();
        let err = run_simulation(&config).await.unwrap_err();
        assert!(err.contains("running"), "Error: {}", err);
        assert!(lock.path().exists());
    }
}
