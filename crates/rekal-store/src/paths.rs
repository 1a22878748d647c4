use std::path::PathBuf;

/// All well-known paths under `.rekal/`.
#[derive(Debug, Clone)]
pub struct RekalPaths {
    pub root: PathBuf,
    pub rekal_dir: PathBuf,
    pub data_db: PathBuf,
    pub lock_file: PathBuf,
    pub config_json: PathBuf,
}

impl RekalPaths {
    /// Derive all paths from a repo root. Pure computation, no I/O.
    pub fn discover(repo_root: impl Into<PathBuf>) -> Self {
        let root = repo_root.into();
        let rekal_dir = root.join(".rekal");
        Self {
            data_db: rekal_dir.join("data.db"),
            lock_file: rekal_dir.join("LOCK"),
            config_json: rekal_dir.join("config.json"),
            rekal_dir,
            root,
        }
    }

    /// Create `.rekal/`. Idempotent.
    pub fn ensure_layout(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.rekal_dir)?;
        Ok(())
    }

    /// Initialised means the directory and its data store both exist.
    pub fn is_initialized(&self) -> bool {
        self.rekal_dir.is_dir() && self.data_db.is_file()
    }
}
