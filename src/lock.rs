use std::fs;
use std::path::{Path, PathBuf};

use crate::log_warn;
use crate::state;

/// Holds the per-collection run lock; released on drop.
#[must_use = "lock is released when CollectionLock is dropped"]
pub struct CollectionLock {
    lock: fslock::LockFile,
    pid_path: PathBuf,
}

impl std::fmt::Debug for CollectionLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionLock")
            .field("pid_path", &self.pid_path)
            .finish()
    }
}

impl Drop for CollectionLock {
    fn drop(&mut self) {
        if let Err(e) = self.lock.unlock() {
            log_warn!("Warning: Failed to release lock: {}", e);
        }
        if let Err(e) = fs::remove_file(&self.pid_path) {
            log_warn!(
                "Warning: Failed to remove PID file {}: {}",
                self.pid_path.display(),
                e
            );
        }
    }
}

/// Lock and PID file paths sitting next to the collection's state document.
pub fn lock_paths(state_dir: &Path, playlist_id: &str) -> (PathBuf, PathBuf) {
    let doc = state::state_path(state_dir, playlist_id);
    (doc.with_extension("lock"), doc.with_extension("pid"))
}

/// Take the run lock for one collection.
///
/// Different collections lock independently. The file lock is taken first,
/// then our PID is written for diagnostics. On contention the PID file is
/// consulted to name the holder.
pub fn try_acquire(state_dir: &Path, playlist_id: &str) -> Result<CollectionLock, String> {
    fs::create_dir_all(state_dir)
        .map_err(|e| format!("Failed to create {}: {}", state_dir.display(), e))?;

    let (lock_path, pid_path) = lock_paths(state_dir, playlist_id);

    let mut lock = fslock::LockFile::open(&lock_path)
        .map_err(|e| format!("Failed to open lock file {}: {}", lock_path.display(), e))?;

    let acquired = lock
        .try_lock()
        .map_err(|e| format!("Failed to acquire lock: {}", e))?;

    if !acquired {
        let holder = fs::read_to_string(&pid_path)
            .ok()
            .and_then(|s| s.trim().parse::<i32>().ok());

        return match holder {
            Some(pid) if is_pid_alive(pid) => Err(format!(
                "Another run is processing collection {} (PID {})",
                playlist_id, pid
            )),
            Some(pid) => Err(format!(
                "Lock file is held but recorded PID {} is not alive. \
                 Remove {} and {} to recover",
                pid,
                lock_path.display(),
                pid_path.display()
            )),
            None => Err(format!(
                "Another process holds the lock for collection {}. \
                 If this is stale, remove {}",
                playlist_id,
                lock_path.display()
            )),
        };
    }

    fs::write(&pid_path, std::process::id().to_string())
        .map_err(|e| format!("Failed to write PID file: {}", e))?;

    Ok(CollectionLock { lock, pid_path })
}

fn is_pid_alive(pid: i32) -> bool {
    // signal 0 probes for existence without delivering anything
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}
