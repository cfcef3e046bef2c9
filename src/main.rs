use clap::{Parser, Subcommand};
use std::path::Path;
use tracing_subscriber::{fmt, EnvFilter};

use hexfront::cli::commands;
use hexfront::config::generation::GameParams;
use hexfront::config::simulation::SimulationConfig;
use hexfront::persistence;
use hexfront::world::board::print_game_summary;
use hexfront::world::coords::Cube;

#[derive(Parser)]
#[command(name = "hexfront")]
#[command(about = "A tick-driven territorial conquest engine on a hexagonal grid")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new game board
    NewGame {
        /// Path to game parameters file
        #[arg(short, long)]
        params: Option<String>,

        /// Override the board radius
        #[arg(short, long)]
        radius: Option<u32>,

        /// Override the seed (0 picks one at random)
        #[arg(short, long)]
        seed: Option<u64>,

        /// Players to seat right away
        #[arg(long = "player")]
        players: Vec<String>,
    },

    /// Seat a player and grant their starting tiles
    Join {
        /// Game ID (optional when only one game exists)
        #[arg(short, long)]
        game: Option<String>,

        /// Player name
        name: String,
    },

    /// Order army from one hex towards another
    Order {
        #[arg(short, long)]
        game: Option<String>,

        /// Name of the ordering player
        #[arg(short, long)]
        player: String,

        /// Source hex as x,y,z
        #[arg(long, allow_hyphen_values = true)]
        from: Cube,

        /// Target hex as x,y,z
        #[arg(long, allow_hyphen_values = true)]
        to: Cube,

        /// Army to send
        #[arg(short, long)]
        amount: u32,
    },

    /// Change how much army a standing movement carries
    Amend {
        #[arg(short, long)]
        game: Option<String>,

        #[arg(short, long)]
        player: String,

        /// Movement ID
        movement: u64,

        #[arg(short, long)]
        amount: u32,
    },

    /// Withdraw a standing movement
    Cancel {
        #[arg(short, long)]
        game: Option<String>,

        #[arg(short, long)]
        player: String,

        /// Movement ID
        movement: u64,
    },

    /// Advance one game by a number of ticks
    Tick {
        #[arg(short, long)]
        game: Option<String>,

        /// Number of ticks to run
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,

        /// Print per-tick statistics as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Tick every stored game at the configured rate until interrupted
    Run,

    /// Inspect a tile, a player or a game summary
    Inspect {
        #[arg(short, long)]
        game: Option<String>,

        /// Hex to inspect as x,y,z
        #[arg(short, long, allow_hyphen_values = true)]
        tile: Option<Cube>,

        /// Player whose tiles and movements to show
        #[arg(short, long)]
        player: Option<String>,

        /// Show the game summary and its movements
        #[arg(long)]
        summary: bool,
    },

    /// Manage game snapshots
    Snapshots {
        #[command(subcommand)]
        action: SnapshotAction,
    },
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// List available snapshots of a game
    List {
        #[arg(short, long)]
        game: Option<String>,
    },

    /// Restore and display a game from a snapshot file
    Restore {
        /// Path to the snapshot file
        file: String,
    },
}

/// Missing config file means defaults; a present but invalid one is an error.
fn load_config(path: &str) -> SimulationConfig {
    let path = Path::new(path);
    if !path.exists() {
        return SimulationConfig::default();
    }
    match SimulationConfig::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }
    }
}

/// `RUST_LOG` wins over the configured level when set.
fn init_tracing(config: &SimulationConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("hexfront={}", config.log_level)));
    if config.log_format == "json" {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn exit_on_error<T>(result: Result<T, String>, context: &str) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            eprintln!("{}: {}", context, e);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(&cli.config);
    init_tracing(&config);

    match cli.command {
        Commands::NewGame {
            params,
            radius,
            seed,
            players,
        } => {
            let mut game_params = match params {
                Some(path) => exit_on_error(
                    GameParams::from_file(Path::new(&path)),
                    "Error loading game parameters",
                ),
                None => GameParams::default(),
            };
            if let Some(r) = radius {
                game_params.radius = r;
            }
            if let Some(s) = seed {
                game_params.seed = s;
            }
            game_params.players.extend(players);
            exit_on_error(commands::new_game(&config, &game_params), "Cannot create game");
        }

        Commands::Join { game, name } => {
            exit_on_error(commands::join(&config, game.as_deref(), &name), "Cannot join");
        }

        Commands::Order {
            game,
            player,
            from,
            to,
            amount,
        } => {
            exit_on_error(
                commands::order(&config, game.as_deref(), &player, from, to, amount),
                "Order rejected",
            );
        }

        Commands::Amend {
            game,
            player,
            movement,
            amount,
        } => {
            exit_on_error(
                commands::amend(&config, game.as_deref(), &player, movement, amount),
                "Amend rejected",
            );
        }

        Commands::Cancel {
            game,
            player,
            movement,
        } => {
            exit_on_error(
                commands::cancel(&config, game.as_deref(), &player, movement),
                "Cancel rejected",
            );
        }

        Commands::Tick { game, count, json } => {
            exit_on_error(
                commands::tick(&config, game.as_deref(), count, json),
                "Tick failed",
            );
        }

        Commands::Run => {
            if let Err(e) = commands::run_simulation(&config).await {
                eprintln!("Simulation error: {}", e);
                std::process::exit(1);
            }
        }

        Commands::Inspect {
            game,
            tile,
            player,
            summary,
        } => {
            exit_on_error(
                commands::inspect(&config, game.as_deref(), tile, player.as_deref(), summary),
                "Error",
            );
        }

        Commands::Snapshots { action } => match action {
            SnapshotAction::List { game } => {
                let root = Path::new(&config.snapshot_directory);
                let ids = match game {
                    Some(raw) => match raw.parse() {
                        Ok(id) => vec![id],
                        Err(e) => {
                            eprintln!("Invalid game id '{}': {}", raw, e);
                            std::process::exit(1);
                        }
                    },
                    None => match persistence::list_games(root) {
                        Ok(ids) => ids,
                        Err(e) => {
                            eprintln!("Error listing games: {}", e);
                            std::process::exit(1);
                        }
                    },
                };
                if ids.is_empty() {
                    println!("No games found in {}", root.display());
                }
                for id in ids {
                    let dir = persistence::game_directory(root, id);
                    match persistence::list_snapshots(&dir) {
                        Ok(snapshots) => {
                            println!("Game {}", id);
                            println!("{:<40} {:>8} {:>12}", "File", "Tick", "Size");
                            println!("{}", "-".repeat(62));
                            for s in &snapshots {
                                let name = s
                                    .path
                                    .file_name()
                                    .and_then(|n| n.to_str())
                                    .unwrap_or("?");
                                let size_kb = s.file_size / 1024;
                                println!("{:<40} {:>8} {:>9} KB", name, s.tick_count, size_kb);
                            }
                            println!("\n{} snapshot(s) in {}\n", snapshots.len(), dir.display());
                        }
                        Err(e) => {
                            eprintln!("Error listing snapshots: {}", e);
                            std::process::exit(1);
                        }
                    }
                }
            }
            SnapshotAction::Restore { file } => {
                let path = Path::new(&file);
                match persistence::load_snapshot(path) {
                    Ok(game) => {
                        println!("Restored game from {}", path.display());
                        print_game_summary(&game);
                    }
                    Err(e) => {
                        eprintln!("Error restoring snapshot: {}", e);
                        std::process::exit(1);
                    }
                }
            }
        },
    }
}
