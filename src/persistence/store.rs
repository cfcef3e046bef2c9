use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use rayon::prelude::*;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::persistence::snapshot::{self, SnapshotError};
use crate::simulation::{self, SimulationError, TickResult};
use crate::world::{Game, OrderError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no game with id {0}")]
    UnknownGame(Uuid),
    #[error("game {0} is already loaded")]
    DuplicateGame(Uuid),
    #[error("game {0} is unavailable after a panic while it was locked")]
    Poisoned(Uuid),
    #[error("cannot start worker pool: {0}")]
    Pool(String),
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Every loaded game, each behind its own mutex shared by ticks and orders.
pub struct GameStore {
    games: RwLock<BTreeMap<Uuid, Arc<Mutex<Game>>>>,
    pool: rayon::ThreadPool,
}

impl GameStore {
    /// An empty store ticking games on `worker_threads` threads (0 picks
    /// one per core).
    pub fn new(worker_threads: usize) -> Result<Self, StoreError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_threads)
            .thread_name(|i| format!("tick-worker-{}", i))
            .build()
            .map_err(|e| StoreError::Pool(e.to_string()))?;
        Ok(GameStore {
            games: RwLock::new(BTreeMap::new()),
            pool,
        })
    }

    /// Load the latest valid snapshot of every game under `root`.
    ///
    /// Games without a readable snapshot are skipped with an error log.
    pub fn load(root: &Path, worker_threads: usize) -> Result<Self, StoreError> {
        let store = GameStore::new(worker_threads)?;
        for id in snapshot::list_games(root)? {
            match snapshot::load_latest_valid_snapshot(&snapshot::game_directory(root, id)) {
                Ok(game) => {
                    store.insert(game)?;
                }
                Err(e) => error!(game = %id, error = %e, "Skipping game without a valid snapshot"),
            }
        }
        Ok(store)
    }

    fn handle(&self, id: Uuid) -> Result<Arc<Mutex<Game>>, StoreError> {
        let games = self.games.read().map_err(|_| StoreError::Poisoned(id))?;
        games.get(&id).cloned().ok_or(StoreError::UnknownGame(id))
    }

    fn lock(id: Uuid, game: &Mutex<Game>) -> Result<MutexGuard<'_, Game>, StoreError> {
        game.lock().map_err(|_| StoreError::Poisoned(id))
    }

    pub fn insert(&self, game: Game) -> Result<Uuid, StoreError> {
        let id = game.id;
        let mut games = self.games.write().map_err(|_| StoreError::Poisoned(id))?;
        if games.contains_key(&id) {
            return Err(StoreError::DuplicateGame(id));
        }
        games.insert(id, Arc::new(Mutex::new(game)));
        Ok(id)
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.games
            .read()
            .map(|games| games.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.games.read().map(|games| games.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A consistent copy of one game, taken between ticks.
    pub fn snapshot(&self, id: Uuid) -> Result<Game, StoreError> {
        let handle = self.handle(id)?;
        let game = Self::lock(id, &handle)?;
        Ok(game.clone())
    }

    /// Apply a player command to a game under its lock.
    pub fn submit<T>(
        &self,
        id: Uuid,
        command: impl FnOnce(&mut Game) -> Result<T, OrderError>,
    ) -> Result<T, StoreError> {
        let handle = self.handle(id)?;
        let mut game = Self::lock(id, &handle)?;
        Ok(command(&mut game)?)
    }

    /// Tick one game. On failure the game keeps its last committed state.
    pub fn simulate(&self, id: Uuid) -> Result<TickResult, StoreError> {
        let handle = self.handle(id)?;
        let mut game = Self::lock(id, &handle)?;
        simulation::execute_tick(&mut game).map_err(|e| {
            error!(game = %id, tick = game.tick_count + 1, error = %e, "Tick failed, state rolled back");
            StoreError::from(e)
        })
    }

    /// Tick every game once, in parallel. Results come back in game id order.
    pub fn simulate_all(&self) -> Vec<(Uuid, Result<TickResult, StoreError>)> {
        let ids = self.ids();
        self.pool
            .install(|| ids.par_iter().map(|&id| (id, self.simulate(id))).collect())
    }

    /// Write a snapshot of one game into its directory under `root`, then
    /// prune that directory to `max_snapshots`.
    pub fn save(&self, id: Uuid, root: &Path, max_snapshots: usize) -> Result<PathBuf, StoreError> {
        let game = self.snapshot(id)?;
        let dir = snapshot::game_directory(root, id);
        let path = snapshot::save_snapshot(&game, &dir)?;
        let pruned = snapshot::prune_snapshots(&dir, max_snapshots)?;
        info!(
            game = %id,
            tick = game.tick_count,
            path = %path.display(),
            pruned = pruned.len(),
            "Snapshot saved"
        );
        Ok(path)
    }
}
