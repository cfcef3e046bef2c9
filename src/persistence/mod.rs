pub mod lock;
pub mod snapshot;
pub mod store;

pub use lock::{ensure_unlocked, run_lock_path, RunLock};
pub use snapshot::{
    game_directory, list_games, list_snapshots, load_latest_valid_snapshot, load_snapshot,
    prune_snapshots, save_snapshot, SnapshotError, SnapshotMetadata,
};
pub use store::{GameStore, StoreError};
