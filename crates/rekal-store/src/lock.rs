use crate::paths::RekalPaths;
use fs2::FileExt;
use std::fs::{File, OpenOptions};

/// Exclusive writer lock backed by `.rekal/LOCK`.
/// Held by capture, push and sync; released on drop.
pub struct WorkspaceLock {
    _file: File,
}

impl WorkspaceLock {
    /// Try to acquire the lock without blocking.
    pub fn acquire(paths: &RekalPaths) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&paths.lock_file)
            .map_err(|e| {
                anyhow::anyhow!("cannot open lock file {}: {}", paths.lock_file.display(), e)
            })?;

        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "workspace is locked by another process ({})",
                paths.lock_file.display()
            )
        })?;

        Ok(Self { _file: file })
    }
}
