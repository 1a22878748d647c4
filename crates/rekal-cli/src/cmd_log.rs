use rekal_core::CheckpointRecord;
use rekal_store::SqliteStore;
use std::path::Path;

use crate::preconditions::Repo;

pub fn execute(cwd: &Path, limit: usize) -> anyhow::Result<()> {
    let repo = Repo::open(cwd)?;
    let store = SqliteStore::open(&repo.paths.data_db)?;
    let checkpoints = store.recent_checkpoints(limit)?;

    if checkpoints.is_empty() {
        println!("No checkpoints yet.");
        return Ok(());
    }
    for cp in &checkpoints {
        println!("{}", format_line(cp));
    }
    println!("\n({} checkpoints shown)", checkpoints.len());
    Ok(())
}

fn format_line(cp: &CheckpointRecord) -> String {
    let sha = cp.git_sha.get(..12).unwrap_or(&cp.git_sha);
    let state = if cp.exported { "pushed" } else { "local" };
    format!(
        "{}  {}  {}  {}  {} session(s)  [{}]  {}",
        cp.ts,
        sha,
        cp.git_branch,
        cp.user_email,
        cp.session_ids.len(),
        state,
        cp.id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rekal_core::ActorKind;

    #[test]
    fn line_format() {
        let cp = CheckpointRecord {
            id: "01JABCDEFGHJKMNPQRSTVWXYZ0".into(),
            git_sha: "0123456789abcdef0123456789abcdef01234567".into(),
            git_branch: "main".into(),
            user_email: "dev@example.com".into(),
            ts: "2026-02-25T10:00:00Z".into(),
            actor: ActorKind::Human,
            agent_id: None,
            exported: false,
            files: vec![],
            session_ids: vec!["a".into(), "b".into()],
        };
        assert_eq!(
            format_line(&cp),
            "2026-02-25T10:00:00Z  0123456789ab  main  dev@example.com  2 session(s)  [local]  01JABCDEFGHJKMNPQRSTVWXYZ0"
        );
    }
}
