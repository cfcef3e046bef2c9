use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::persistence::snapshot::SnapshotError;

const RUN_LOCK_FILE: &str = "run.lock";

/// Path of the marker a running simulation keeps in a snapshot root.
pub fn run_lock_path(root: &Path) -> PathBuf {
    root.join(RUN_LOCK_FILE)
}

/// Exclusive claim on every game under a snapshot root, held by `run`.
///
/// While it exists, the games live in the running store and snapshot files
/// are only written by it. Dropping the lock removes the marker file.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(root: &Path) -> Result<Self, SnapshotError> {
        fs::create_dir_all(root)?;
        let path = run_lock_path(root);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(SnapshotError::Locked(path));
            }
            Err(e) => return Err(e.into()),
        };
        let lock = RunLock { path };
        writeln!(file, "{}", std::process::id())?;
        info!(path = %lock.path.display(), "Run lock taken");
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => info!(path = %self.path.display(), "Run lock released"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Cannot remove run lock"),
        }
    }
}

/// Fail with [`SnapshotError::Locked`] while a simulation holds `root`.
pub fn ensure_unlocked(root: &Path) -> Result<(), SnapshotError> {
    let path = run_lock_path(root);
    if path.exists() {
        return Err(SnapshotError::Locked(path));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_acquire_fails_until_release() {
        let dir = TempDir::new().unwrap();
        let lock = RunLock::acquire(dir.path()).unwrap();
        assert!(lock.path().exists());
        assert!(matches!(
            RunLock::acquire(dir.path()),
            Err(SnapshotError::Locked(_))
        ));
        assert!(ensure_unlocked(dir.path()).is_err());

        drop(lock);
        assert!(!run_lock_path(dir.path()).exists());
        assert!(ensure_unlocked(dir.path()).is_ok());
        RunLock::acquire(dir.path()).unwrap();
    }

    #[test]
    fn lock_records_the_owning_process() {
        let dir = TempDir::new().unwrap();
        let lock = RunLock::acquire(&dir.path().join("nested")).unwrap();
        let pid = fs::read_to_string(lock.path()).unwrap();
        assert_eq!(pid.trim(), std::process::id().to_string());
    }

    #[test]
    fn lock_file_is_not_a_game() {
        let dir = TempDir::new().unwrap();
        let _lock = RunLock::acquire(dir.path()).unwrap();
        assert!(crate::persistence::list_games(dir.path()).unwrap().is_empty());
    }
}
