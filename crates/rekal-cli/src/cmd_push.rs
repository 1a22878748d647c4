use rekal_store::{SqliteStore, WorkspaceLock};
use rekal_sync::{export, is_wire_limit, push, PushError, PushOutcome};
use std::path::Path;
use tracing::debug;

use crate::preconditions::Repo;

/// `rekal push [--force]`: export pending checkpoints, then publish the
/// portable branch. Transport failures are silent and wire-format limits
/// only warn, so a pre-push hook never blocks the user's own push.
pub fn execute(cwd: &Path, force: bool) -> anyhow::Result<()> {
    let mut repo = Repo::open(cwd)?;
    let _lock = WorkspaceLock::acquire(&repo.paths)?;
    let store = SqliteStore::open(&repo.paths.data_db)?;

    let email = repo.email();
    let branch = repo.branch();
    let remote = repo.config.remote.clone();
    if let Err(err) = export(
        &mut repo.git,
        &store,
        &branch,
        &email,
        repo.config.compression_level,
    ) {
        if !is_wire_limit(&err) {
            return Err(err);
        }
        eprintln!("rekal: export skipped: {err:#}");
    }

    match push(&mut repo.git, &remote, &branch, force) {
        Ok(PushOutcome::Pushed) => eprintln!("rekal: pushed to {remote}/{branch}"),
        Ok(PushOutcome::ForcePushed) => eprintln!("rekal: force pushed to {remote}/{branch}"),
        Ok(outcome) => debug!(?outcome, "nothing pushed"),
        Err(PushError::Conflict { remote, branch }) => {
            eprintln!("rekal: push rejected (non-fast-forward) for {remote}/{branch}");
            eprintln!(
                "rekal: your remote branch has diverged from local; review and run \
                 'rekal push --force' to overwrite remote with local data"
            );
        }
        Err(e @ PushError::Transport { .. }) => debug!(error = %e, "push failed, ignoring"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rekal_core::{ActorKind, CheckpointRecord};
    use rekal_store::RekalPaths;
    use std::process::Command;

    fn initialised_repo() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        for args in [
            &["init", "-q"][..],
            &["config", "user.email", "dev@example.com"][..],
            &["config", "user.name", "Dev"][..],
        ] {
            let ok = Command::new("git")
                .args(args)
                .current_dir(tmp.path())
                .status()
                .unwrap()
                .success();
            assert!(ok);
        }
        crate::cmd_init::execute(tmp.path()).unwrap();
        tmp
    }

    #[test]
    fn full_emails_dictionary_does_not_fail_the_push() {
        let tmp = initialised_repo();
        let paths = RekalPaths::discover(tmp.path());
        let store = SqliteStore::open(&paths.data_db).unwrap();
        for i in 0..300 {
            store
                .insert_checkpoint(&CheckpointRecord {
                    id: format!("C{i:025}"),
                    git_sha: "0".repeat(40),
                    git_branch: "main".into(),
                    user_email: format!("dev{i}@example.com"),
                    ts: "2026-02-25T10:00:00Z".into(),
                    actor: ActorKind::Human,
                    agent_id: None,
                    exported: false,
                    files: vec![],
                    session_ids: vec![],
                })
                .unwrap();
        }
        drop(store);

        execute(tmp.path(), false).unwrap();

        let store = SqliteStore::open(&paths.data_db).unwrap();
        assert_eq!(store.unexported_checkpoints().unwrap().len(), 300);
    }
}
