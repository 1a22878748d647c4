use rekal_core::UlidGen;
use rekal_store::{SqliteStore, WorkspaceLock};
use rekal_sync::capture;
use rekal_transcript::ClaudeTranscripts;
use std::path::Path;

use crate::preconditions::Repo;

/// `rekal checkpoint`: capture new transcripts against the current commit.
pub fn execute(cwd: &Path) -> anyhow::Result<()> {
    let repo = Repo::open(cwd)?;
    let _lock = WorkspaceLock::acquire(&repo.paths)?;
    let store = SqliteStore::open(&repo.paths.data_db)?;

    let source = match repo.config.session_dir_override() {
        Some(dir) => ClaudeTranscripts::with_session_dir(dir),
        None => ClaudeTranscripts::new(),
    };
    let n = capture(&repo.git, &store, &source, &mut UlidGen::new(), &repo.email())?;
    if n > 0 {
        eprintln!("rekal: {n} session(s) captured");
    }
    Ok(())
}
