use rekal_core::UlidGen;
use rekal_store::{SqliteStore, WorkspaceLock};
use rekal_sync::import_remote_branches;
use std::path::Path;

use crate::preconditions::Repo;

/// `rekal sync`: fetch every portable branch from the remote and import it.
pub fn execute(cwd: &Path) -> anyhow::Result<()> {
    let mut repo = Repo::open(cwd)?;
    let _lock = WorkspaceLock::acquire(&repo.paths)?;
    let store = SqliteStore::open(&repo.paths.data_db)?;

    let stats = import_remote_branches(
        &mut repo.git,
        &store,
        &mut UlidGen::new(),
        &repo.config.remote,
        &repo.config.branch_prefix,
    )?;
    eprintln!("rekal: imported {} session(s)", stats.sessions);
    Ok(())
}
