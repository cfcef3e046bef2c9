use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::config::generation::MAX_RADIUS;
use crate::world::Game;
use crate::world::board::hex_tile_count;

/// Metadata about a snapshot file on disk.
#[derive(Debug, Clone)]
pub struct SnapshotMetadata {
    pub path: PathBuf,
    pub tick_count: u64,
    pub timestamp: u64,
    pub file_size: u64,
}

/// Errors that can occur during snapshot operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serialize(String),
    #[error("Deserialization error: {0}")]
    Deserialize(String),
    #[error("Corrupt snapshot: {}", .0.display())]
    Corrupt(PathBuf),
    #[error("No valid snapshots found. Create a game with: hexfront new-game")]
    NoValidSnapshots,
    #[error(
        "A simulation is running on these games; stop it first (or delete {} if it crashed)",
        .0.display()
    )]
    Locked(PathBuf),
}

/// Build a snapshot filename from tick count and timestamp.
fn snapshot_filename(tick_count: u64, timestamp: u64) -> String {
    format!("game-tick{}-{}.bin", tick_count, timestamp)
}

/// Parse tick count and timestamp from a snapshot filename.
/// Expected format: `game-tick{N}-{timestamp}.bin`
fn parse_snapshot_filename(filename: &str) -> Option<(u64, u64)> {
    let stem = filename.strip_suffix(".bin")?;
    let rest = stem.strip_prefix("game-tick")?;
    let (tick_str, ts_str) = rest.split_once('-')?;
    let tick = tick_str.parse::<u64>().ok()?;
    let ts = ts_str.parse::<u64>().ok()?;
    Some((tick, ts))
}

fn unix_timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Directory holding one game's snapshots under the snapshot root.
pub fn game_directory(root: &Path, id: Uuid) -> PathBuf {
    root.join(id.to_string())
}

/// Ids of every game with a directory under the snapshot root, sorted.
pub fn list_games(root: &Path) -> Result<Vec<Uuid>, SnapshotError> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        if let Some(id) = entry
            .file_name()
            .to_str()
            .and_then(|n| Uuid::parse_str(n).ok())
        {
            ids.push(id);
        }
    }
    ids.sort();
    Ok(ids)
}

/// Save a game snapshot to the snapshot directory using atomic write.
///
/// Writes to a temporary file first, then atomically renames to the final path.
/// This ensures a partial write never corrupts an existing snapshot.
pub fn save_snapshot(game: &Game, snapshot_dir: &Path) -> Result<PathBuf, SnapshotError> {
    fs::create_dir_all(snapshot_dir)?;

    let ts = unix_timestamp_now();
    let filename = snapshot_filename(game.tick_count, ts);
    let target = snapshot_dir.join(&filename);
    let tmp = snapshot_dir.join(format!(".{}.tmp", filename));

    let encoded = bincode::serialize(game).map_err(|e| SnapshotError::Serialize(e.to_string()))?;

    if let Err(e) = fs::write(&tmp, &encoded) {
        let _ = fs::remove_file(&tmp);
        return Err(SnapshotError::Io(e));
    }

    if let Err(e) = fs::rename(&tmp, &target) {
        let _ = fs::remove_file(&tmp);
        return Err(SnapshotError::Io(e));
    }

    Ok(target)
}

/// A decoded game is only accepted if its board is complete and every
/// movement points at tiles on it.
fn is_consistent(game: &Game) -> bool {
    if game.radius > MAX_RADIUS || game.tiles.len() as u32 != hex_tile_count(game.radius) {
        return false;
    }
    let tile_ids: HashSet<_> = game.tiles.iter().map(|t| t.id).collect();
    if tile_ids.len() != game.tiles.len() {
        return false;
    }
    let mut movement_ids = HashSet::new();
    game.movements.iter().all(|m| {
        movement_ids.insert(m.id)
            && m.id < game.next_movement_id
            && m.amount > 0
            && m.source != m.target
            && tile_ids.contains(&m.source)
            && tile_ids.contains(&m.target)
    })
}

/// Load a game from a snapshot file.
pub fn load_snapshot(path: &Path) -> Result<Game, SnapshotError> {
    let data = fs::read(path)?;
    let game: Game =
        bincode::deserialize(&data).map_err(|e| SnapshotError::Deserialize(e.to_string()))?;

    if !is_consistent(&game) {
        return Err(SnapshotError::Corrupt(path.to_path_buf()));
    }

    Ok(game)
}

/// List all valid snapshots in a directory, sorted by timestamp descending (newest first).
pub fn list_snapshots(snapshot_dir: &Path) -> Result<Vec<SnapshotMetadata>, SnapshotError> {
    if !snapshot_dir.exists() {
        return Ok(Vec::new());
    }

    let mut snapshots = Vec::new();

    for entry in fs::read_dir(snapshot_dir)? {
        let entry = entry?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }

        let filename = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };

        // Skip temp files
        if filename.starts_with('.') {
            continue;
        }

        if let Some((tick_count, timestamp)) = parse_snapshot_filename(&filename) {
            let file_size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            snapshots.push(SnapshotMetadata {
                path: path.clone(),
                tick_count,
                timestamp,
                file_size,
            });
        }
    }

    // Sort by timestamp descending (newest first), then tick count as tiebreaker
    snapshots.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then(b.tick_count.cmp(&a.tick_count))
    });

    Ok(snapshots)
}

/// Prune old snapshots, keeping only the `max_snapshots` most recent.
///
/// Returns the list of deleted file paths.
pub fn prune_snapshots(
    snapshot_dir: &Path,
    max_snapshots: usize,
) -> Result<Vec<PathBuf>, SnapshotError> {
    let snapshots = list_snapshots(snapshot_dir)?;

    let mut deleted = Vec::new();
    if snapshots.len() > max_snapshots {
        for snapshot in &snapshots[max_snapshots..] {
            fs::remove_file(&snapshot.path)?;
            deleted.push(snapshot.path.clone());
        }
    }

    Ok(deleted)
}

/// Load the most recent valid snapshot, falling back to older ones if the latest is corrupt.
///
/// Returns an error only if no valid snapshots exist.
pub fn load_latest_valid_snapshot(snapshot_dir: &Path) -> Result<Game, SnapshotError> {
    let snapshots = list_snapshots(snapshot_dir)?;

    for snapshot in &snapshots {
        match load_snapshot(&snapshot.path) {
            Ok(game) => return Ok(game),
            Err(e) => {
                warn!(
                    path = %snapshot.path.display(),
                    error = %e,
                    "Corrupt snapshot, trying next"
                );
            }
        }
    }

    Err(SnapshotError::NoValidSnapshots)
}
