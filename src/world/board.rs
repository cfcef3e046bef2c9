use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use crate::config::generation::GameParams;
use crate::world::coords::Cube;
use crate::world::tile::{PlayerId, Tile, TileId};
use crate::world::Game;

/// Number of tiles on a hexagonal board: `3r(r+1) + 1`.
pub fn hex_tile_count(radius: u32) -> u32 {
    3 * radius * (radius + 1) + 1
}

/// Generate every tile of a hexagonal board centred on the origin.
///
/// Tiles are emitted with x outermost and y innermost, and tile `n` gets
/// id `n`. All tiles start unowned and empty.
pub fn generate_hexagonal_tiles(radius: u32) -> Vec<Tile> {
    let r = radius as i32;
    let mut tiles = Vec::with_capacity(hex_tile_count(radius) as usize);
    for x in -r..=r {
        for y in -r..=r {
            let coords = Cube::from_xy(x, y);
            if coords.z.abs() <= r {
                let id = tiles.len() as TileId;
                tiles.push(Tile::new_unowned(id, coords));
            }
        }
    }
    tiles
}

/// Create a new game from the given parameters and seat `params.players`.
///
/// If `params.seed` is 0, a random seed is chosen. The actual seed used
/// is stored in the returned game's `params` for reproducibility.
/// Parameters are validated first; the error lists every problem found.
pub fn generate_game(params: &GameParams) -> Result<Game, String> {
    params.validate()?;
    let seed = if params.seed == 0 {
        rand::thread_rng().r#gen()
    } else {
        params.seed
    };
    let resolved_params = GameParams {
        seed,
        ..params.clone()
    };
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let id = Uuid::from_bytes(rng.r#gen());

    let mut game = Game {
        id,
        name: format!("Game-{}", seed),
        created_at: format!(
            "{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs()
        ),
        tick_count: 0,
        radius: params.radius,
        params: resolved_params,
        players: Vec::new(),
        tiles: generate_hexagonal_tiles(params.radius),
        movements: Vec::new(),
        next_movement_id: 1,
    };

    for name in &params.players {
        game.add_player(name).map_err(|e| e.to_string())?;
    }

    Ok(game)
}

/// Hand `tile_count` free tiles with `army` each to `player`.
///
/// The starting tile is a free tile nearest the origin; equally near
/// candidates are chosen between by an RNG seeded from the game seed and
/// the player id. The rest of the grant is the free tiles nearest that
/// starting tile, closer first and lower id first.
pub fn grant_initial_tiles(
    game: &mut Game,
    player: PlayerId,
    tile_count: u32,
    army: u32,
) -> Vec<TileId> {
    let free: Vec<usize> = (0..game.tiles.len())
        .filter(|&i| game.tiles[i].owner.is_none())
        .collect();
    let Some(nearest) = free
        .iter()
        .map(|&i| game.tiles[i].coords.distance(Cube::ORIGIN))
        .min()
    else {
        return Vec::new();
    };

    let candidates: Vec<usize> = free
        .iter()
        .copied()
        .filter(|&i| game.tiles[i].coords.distance(Cube::ORIGIN) == nearest)
        .collect();
    let mut rng = ChaCha8Rng::seed_from_u64(
        game.params
            .seed
            .wrapping_add((player as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)),
    );
    let start = game.tiles[candidates[rng.gen_range(0..candidates.len())]].coords;

    let mut ranked = free;
    ranked.sort_by_key(|&i| (game.tiles[i].coords.distance(start), game.tiles[i].id));
    ranked.truncate(tile_count as usize);

    ranked
        .into_iter()
        .map(|i| {
            let tile = &mut game.tiles[i];
            tile.owner = Some(player);
            tile.army = army;
            tile.id
        })
        .collect()
}

/// Print a summary of the game board.
pub fn print_game_summary(game: &Game) {
    println!("=== Game Summary ===");
    println!("Name: {}", game.name);
    println!("ID: {}", game.id);
    println!("Radius: {} ({} tiles)", game.radius, game.tiles.len());
    println!("Seed: {}", game.params.seed);
    println!("Tick: {}", game.tick_count);

    let totals = game.army_by_owner();
    println!("\nPlayers:");
    if game.players.is_empty() {
        println!("  (none)");
    }
    for player in &game.players {
        let tiles = game
            .tiles
            .iter()
            .filter(|t| t.owner == Some(player.id))
            .count();
        let army = totals.get(&Some(player.id)).copied().unwrap_or(0);
        println!(
            "  #{:<3} {:<16} {:>5} tiles {:>8} army",
            player.id, player.name, tiles, army
        );
    }
    let unowned = game.tiles.iter().filter(|t| t.owner.is_none()).count();
    println!(
        "  {:<20} {:>5} tiles {:>8} army",
        "unowned",
        unowned,
        totals.get(&None).copied().unwrap_or(0)
    );
    println!("\nMovements in flight: {}", game.movements.len());
}
