use anyhow::Context;
use rekal_core::ts::now_rfc3339;
use rekal_core::{
    sha256_hex, ActorKind, ChangeType, CheckpointRecord, FileTouchedRow, IdGen, NotSupported,
    SessionRecord, ToolCallRow, TurnRow,
};
use rekal_git::{GitTransport, ZERO_OID};
use rekal_store::SqliteStore;
use rekal_transcript::{SessionPayload, TranscriptSource};
use tracing::{debug, info, warn};

/// Record new transcripts as sessions plus one checkpoint on the current
/// commit. Returns how many sessions were captured.
///
/// Rows land in the store immediately with `exported = false`; publishing
/// them to the portable branch is [`crate::export`]'s job.
pub fn capture(
    git: &dyn GitTransport,
    store: &SqliteStore,
    source: &dyn TranscriptSource,
    ids: &mut dyn IdGen,
    email: &str,
) -> anyhow::Result<usize> {
    let files = match source.session_files(git.root()) {
        Ok(files) => files,
        Err(e) if e.downcast_ref::<NotSupported>().is_some() => {
            debug!(error = %e, "transcript source unavailable");
            return Ok(0);
        }
        Err(e) => return Err(e.context("find session files")),
    };

    let mut session_ids = Vec::new();
    for file in &files {
        let data = match source.read(file) {
            Ok(d) => d,
            Err(e) => {
                warn!(file = %file.display(), error = %e, "cannot read transcript, skipping");
                continue;
            }
        };
        if data.is_empty() {
            continue;
        }

        let hash = sha256_hex(&data);
        if store.session_exists_by_hash(&hash).context("dedup check")? {
            continue;
        }

        let payload = match source.parse(&data) {
            Ok(p) => p,
            Err(e) => {
                warn!(file = %file.display(), error = %e, "unparsable transcript, skipping");
                continue;
            }
        };
        if payload.is_empty() {
            continue;
        }

        let record = session_record(payload, hash, email, ids);
        store.insert_session(&record).context("insert session")?;
        debug!(session = %record.id, file = %file.display(), "captured session");
        session_ids.push(record.id);
    }

    if session_ids.is_empty() {
        return Ok(0);
    }

    let files_touched = git
        .changed_files()
        .into_iter()
        .map(|c| FileTouchedRow {
            id: ids.next_id(),
            change_type: ChangeType::from_status(&c.status),
            path: c.path,
        })
        .collect();

    let checkpoint = CheckpointRecord {
        id: ids.next_id(),
        git_sha: git.head_sha().unwrap_or_else(|| ZERO_OID.to_string()),
        git_branch: git.current_branch().unwrap_or_else(|| "unknown".to_string()),
        user_email: email.to_string(),
        ts: now_rfc3339(),
        actor: ActorKind::Human,
        agent_id: None,
        exported: false,
        files: files_touched,
        session_ids,
    };
    store
        .insert_checkpoint(&checkpoint)
        .context("insert checkpoint")?;

    let n = checkpoint.session_ids.len();
    info!(checkpoint = %checkpoint.id, sessions = n, "checkpoint recorded");
    Ok(n)
}

fn session_record(
    payload: SessionPayload,
    hash: String,
    email: &str,
    ids: &mut dyn IdGen,
) -> SessionRecord {
    let id = ids.next_id();
    let turns = payload
        .turns
        .into_iter()
        .map(|t| TurnRow {
            id: ids.next_id(),
            role: t.role,
            content: t.content,
            ts: t.timestamp,
        })
        .collect();
    let tool_calls = payload
        .tool_calls
        .into_iter()
        .map(|c| ToolCallRow {
            id: ids.next_id(),
            tool: c.tool,
            path: c.path,
            cmd_prefix: c.cmd_prefix,
        })
        .collect();
    SessionRecord {
        id,
        session_hash: hash,
        captured_at: now_rfc3339(),
        actor: payload.actor,
        agent_id: payload.agent_id,
        user_email: email.to_string(),
        branch: payload.branch,
        turns,
        tool_calls,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use rekal_core::SeqIdGen;
    use rekal_git::MemoryGit;

    #[test]
    fn captures_sessions_and_one_checkpoint() {
        let ws = Workspace::new();
        ws.write_transcript("s1.jsonl", SESSION_1);
        let git = dev_git();

        let n = capture(&git, &ws.store, &ws.source(), &mut SeqIdGen::new("A"), EMAIL).unwrap();
        assert_eq!(n, 1);

        let pending = ws.store.unexported_checkpoints().unwrap();
        assert_eq!(pending.len(), 1);
        let cp = &pending[0];
        assert_eq!(cp.git_branch, "main");
        assert_eq!(cp.git_sha, HEAD_SHA);
        assert_eq!(cp.files.len(), 1);
        assert_eq!(cp.files[0].path, "login.go");
        assert_eq!(cp.files[0].change_type, ChangeType::Modified);

        let s = ws.store.load_session(&cp.session_ids[0]).unwrap().unwrap();
        assert_eq!(s.turns.len(), 5);
        assert_eq!(s.tool_calls.len(), 3);
        assert_eq!(s.branch.as_deref(), Some("main"));
        assert_eq!(s.user_email, EMAIL);
    }

    #[test]
    fn recapture_is_idempotent() {
        let ws = Workspace::new();
        ws.write_transcript("s1.jsonl", SESSION_1);
        let git = dev_git();
        let mut ids = SeqIdGen::new("A");

        assert_eq!(capture(&git, &ws.store, &ws.source(), &mut ids, EMAIL).unwrap(), 1);
        assert_eq!(capture(&git, &ws.store, &ws.source(), &mut ids, EMAIL).unwrap(), 0);
        assert_eq!(ws.store.session_count().unwrap(), 1);
        assert_eq!(ws.store.checkpoint_count().unwrap(), 1);
    }

    #[test]
    fn identical_content_under_two_names_is_one_session() {
        let ws = Workspace::new();
        ws.write_transcript("a.jsonl", SESSION_1);
        ws.write_transcript("b.jsonl", SESSION_1);
        let git = dev_git();

        let n = capture(&git, &ws.store, &ws.source(), &mut SeqIdGen::new("A"), EMAIL).unwrap();
        assert_eq!(n, 1);
        assert_eq!(ws.store.session_count().unwrap(), 1);
    }

    #[test]
    fn bad_and_empty_files_are_skipped() {
        let ws = Workspace::new();
        ws.write_transcript("bad.jsonl", "not json at all\n");
        ws.write_transcript("empty.jsonl", "");
        ws.write_transcript("summary.jsonl", r#"{"type":"summary"}"#);
        ws.write_transcript("good.jsonl", SESSION_2);
        let git = dev_git();

        let n = capture(&git, &ws.store, &ws.source(), &mut SeqIdGen::new("A"), EMAIL).unwrap();
        assert_eq!(n, 1);
        let cp = &ws.store.unexported_checkpoints().unwrap()[0];
        let s = ws.store.load_session(&cp.session_ids[0]).unwrap().unwrap();
        assert_eq!(s.turns.len(), 3);
        assert_eq!(s.tool_calls.len(), 1);
        assert_eq!(s.branch.as_deref(), Some("feature/logging"));
    }

    #[test]
    fn nothing_to_capture_writes_no_checkpoint() {
        let ws = Workspace::new();
        let git = MemoryGit::new("/repo");
        let n = capture(&git, &ws.store, &ws.source(), &mut SeqIdGen::new("A"), EMAIL).unwrap();
        assert_eq!(n, 0);
        assert_eq!(ws.store.checkpoint_count().unwrap(), 0);
    }

    #[test]
    fn unsupported_source_is_a_no_op() {
        let ws = Workspace::new();
        let git = dev_git();
        let n = capture(&git, &ws.store, &Unsupported, &mut SeqIdGen::new("A"), EMAIL).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn detached_metadata_falls_back() {
        let ws = Workspace::new();
        ws.write_transcript("s.jsonl", SESSION_1);
        let git = MemoryGit::new("/repo");
        capture(&git, &ws.store, &ws.source(), &mut SeqIdGen::new("A"), EMAIL).unwrap();
        let cp = &ws.store.unexported_checkpoints().unwrap()[0];
        assert_eq!(cp.git_sha, ZERO_OID);
        assert_eq!(cp.git_branch, "unknown");
        assert!(cp.files.is_empty());
    }
}
