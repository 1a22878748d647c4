use anyhow::Context;
use rekal_codec::{
    scan_frames, CheckpointFrame, Dict, Frame, FrameDecoder, Namespace, PathRepr, SessionFrame,
    BODY_HEADER_LEN,
};
use rekal_core::hash::wire_session_hash;
use rekal_core::ts::unix_to_rfc3339;
use rekal_core::{
    ActorKind, CheckpointRecord, FileTouchedRow, IdGen, SessionRecord, ToolCallRow, TurnRow,
};
use rekal_git::GitTransport;
use rekal_store::SqliteStore;
use tracing::{debug, info, warn};

use crate::wire::{BODY_FILE, DICT_FILE};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub sessions: usize,
    pub checkpoints: usize,
}

impl ImportStats {
    fn add(&mut self, other: ImportStats) {
        self.sessions += other.sessions;
        self.checkpoints += other.checkpoints;
    }
}

/// Absorb one branch's wire files into the store.
///
/// Sessions and checkpoints already present (by id) are skipped, so
/// re-importing is a no-op. Imported checkpoints are stored as exported: they
/// came from the wire and must not be published again. A frame that fails to
/// decode or references unknown dictionary entries is skipped on its own.
pub fn import_wire(
    dict_bytes: &[u8],
    body_bytes: &[u8],
    store: &SqliteStore,
    ids: &mut dyn IdGen,
) -> anyhow::Result<ImportStats> {
    let mut stats = ImportStats::default();
    if body_bytes.len() <= BODY_HEADER_LEN || dict_bytes.is_empty() {
        return Ok(stats);
    }

    let dict = Dict::decode(dict_bytes).context("load dictionary")?;
    let slices = scan_frames(body_bytes).context("scan body")?;
    let mut dec = FrameDecoder::for_body(body_bytes)?;

    for slice in &slices {
        let frame = match dec.decode(body_bytes, slice) {
            Ok(f) => f,
            Err(e) => {
                warn!(offset = slice.offset, tag = slice.tag, error = %e, "skipping malformed frame");
                continue;
            }
        };
        match frame {
            Frame::Session(sf) => {
                if import_session(&dict, &sf, store, ids)? {
                    stats.sessions += 1;
                }
            }
            Frame::Checkpoint(cf) => {
                if import_checkpoint(&dict, &cf, store, ids)? {
                    stats.checkpoints += 1;
                }
            }
            Frame::Meta(_) | Frame::Tombstone(_) => {}
        }
    }
    Ok(stats)
}

fn lookup(dict: &Dict, ns: Namespace, index: u64) -> Option<String> {
    match dict.get(ns, index) {
        Ok(v) => Some(v.to_string()),
        Err(e) => {
            debug!(error = %e, "dangling dictionary reference");
            None
        }
    }
}

fn agent_id(dict: &Dict, actor: ActorKind, agent_ref: Option<u64>) -> Option<String> {
    match (actor, agent_ref) {
        (ActorKind::Agent, Some(r)) => lookup(dict, Namespace::Emails, r),
        _ => None,
    }
}

fn import_session(
    dict: &Dict,
    sf: &SessionFrame,
    store: &SqliteStore,
    ids: &mut dyn IdGen,
) -> anyhow::Result<bool> {
    let Some(id) = lookup(dict, Namespace::Sessions, sf.session_ref) else {
        return Ok(false);
    };
    if store.session_exists(&id)? {
        return Ok(false);
    }

    let branch = sf
        .turns
        .first()
        .and_then(|t| lookup(dict, Namespace::Branches, t.branch_ref))
        .filter(|b| !b.is_empty());

    let turns = sf
        .turns
        .iter()
        .map(|t| TurnRow {
            id: ids.next_id(),
            role: t.role,
            content: t.text.clone(),
            ts: None,
        })
        .collect();
    let tool_calls = sf
        .tool_calls
        .iter()
        .map(|c| ToolCallRow {
            id: ids.next_id(),
            tool: c.tool.name().to_string(),
            path: match &c.path {
                PathRepr::Null => None,
                PathRepr::Ref(r) => lookup(dict, Namespace::Paths, *r),
                PathRepr::Inline(p) => Some(p.clone()),
            },
            cmd_prefix: Some(c.cmd_prefix.clone()).filter(|s| !s.is_empty()),
        })
        .collect();

    let record = SessionRecord {
        session_hash: wire_session_hash(&id),
        id,
        captured_at: unix_to_rfc3339(sf.captured_at),
        actor: sf.actor,
        agent_id: agent_id(dict, sf.actor, sf.agent_ref),
        user_email: lookup(dict, Namespace::Emails, sf.email_ref).unwrap_or_default(),
        branch,
        turns,
        tool_calls,
    };
    store.insert_session(&record).context("insert imported session")?;
    Ok(true)
}

fn import_checkpoint(
    dict: &Dict,
    cf: &CheckpointFrame,
    store: &SqliteStore,
    ids: &mut dyn IdGen,
) -> anyhow::Result<bool> {
    if cf.checkpoint_id.is_empty() || store.checkpoint_exists(&cf.checkpoint_id)? {
        return Ok(false);
    }

    let mut session_ids = Vec::with_capacity(cf.session_refs.len());
    for r in &cf.session_refs {
        let Some(sid) = lookup(dict, Namespace::Sessions, *r) else {
            continue;
        };
        if store.session_exists(&sid)? {
            session_ids.push(sid);
        } else {
            debug!(checkpoint = %cf.checkpoint_id, session = %sid, "dropping link to unknown session");
        }
    }

    let files = cf
        .files
        .iter()
        .filter_map(|f| {
            let path = lookup(dict, Namespace::Paths, f.path_ref)?;
            Some(FileTouchedRow {
                id: ids.next_id(),
                path,
                change_type: f.change_type,
            })
        })
        .collect();

    let record = CheckpointRecord {
        id: cf.checkpoint_id.clone(),
        git_sha: cf.git_sha.clone(),
        git_branch: lookup(dict, Namespace::Branches, cf.branch_ref).unwrap_or_default(),
        user_email: lookup(dict, Namespace::Emails, cf.email_ref).unwrap_or_default(),
        ts: unix_to_rfc3339(cf.timestamp),
        actor: cf.actor,
        agent_id: agent_id(dict, cf.actor, cf.agent_ref),
        exported: true,
        files,
        session_ids,
    };
    store
        .insert_checkpoint(&record)
        .context("insert imported checkpoint")?;
    Ok(true)
}

/// Fetch every portable branch under `prefix` from `remote` and import each.
///
/// A branch whose wire files cannot be read is reported and skipped.
pub fn import_remote_branches(
    git: &mut dyn GitTransport,
    store: &SqliteStore,
    ids: &mut dyn IdGen,
    remote: &str,
    prefix: &str,
) -> anyhow::Result<ImportStats> {
    let mut total = ImportStats::default();
    if !git.has_remote(remote)? {
        debug!(remote, "no such remote, nothing to import");
        return Ok(total);
    }

    let refspec = format!("+refs/heads/{prefix}*:refs/remotes/{remote}/{prefix}*");
    git.fetch(remote, &refspec)
        .with_context(|| format!("fetch {prefix}* from {remote}"))?;

    for refname in git.list_refs(&format!("refs/remotes/{remote}/{prefix}"))? {
        let body = git.read_file(&refname, BODY_FILE)?.unwrap_or_default();
        let dict = git.read_file(&refname, DICT_FILE)?.unwrap_or_default();
        match import_wire(&dict, &body, store, ids) {
            Ok(stats) => {
                debug!(branch = %refname, sessions = stats.sessions, checkpoints = stats.checkpoints, "imported branch");
                total.add(stats);
            }
            Err(e) => warn!(branch = %refname, error = %e, "skipping unreadable branch"),
        }
    }

    info!(remote, sessions = total.sessions, checkpoints = total.checkpoints, "import finished");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::capture;
    use crate::export::export;
    use crate::push::push;
    use crate::test_support::*;
    use crate::wire::WireState;
    use rekal_codec::{
        CodecError, FrameEncoder, MetaFrame, DEFAULT_LEVEL, FLAG_PRESET_DICT, FORMAT_VERSION,
    };
    use rekal_core::{SeqIdGen, ToolCode};
    use rekal_git::{MemoryGit, MemoryRemote};

    /// Capture two sessions on `git` and export them; returns the wire files.
    fn exported_wire(ws: &Workspace, git: &mut MemoryGit) -> (Vec<u8>, Vec<u8>) {
        let mut ids = SeqIdGen::new("A");
        ws.write_transcript("s1.jsonl", SESSION_1);
        capture(&*git, &ws.store, &ws.source(), &mut ids, EMAIL).unwrap();
        export(git, &ws.store, BRANCH, EMAIL, DEFAULT_LEVEL).unwrap();
        ws.write_transcript("s2.jsonl", SESSION_2);
        capture(&*git, &ws.store, &ws.source(), &mut ids, EMAIL).unwrap();
        export(git, &ws.store, BRANCH, EMAIL, DEFAULT_LEVEL).unwrap();

        let state = WireState::load(&*git, BRANCH).unwrap();
        (state.dict.encode().unwrap(), state.body)
    }

    #[test]
    fn round_trip_into_a_fresh_store() {
        let origin = Workspace::new();
        let mut git = dev_git();
        let (dict, body) = exported_wire(&origin, &mut git);

        let other = Workspace::new();
        let stats = import_wire(&dict, &body, &other.store, &mut SeqIdGen::new("I")).unwrap();
        assert_eq!(stats, ImportStats { sessions: 2, checkpoints: 2 });

        let cps = other.store.recent_checkpoints(10).unwrap();
        assert_eq!(cps.len(), 2);
        assert!(cps.iter().all(|c| c.exported));
        assert!(other.store.unexported_checkpoints().unwrap().is_empty());

        let first = cps.iter().find(|c| c.session_ids.len() == 1).unwrap();
        assert_eq!(first.git_sha, HEAD_SHA);
        assert_eq!(first.files[0].path, "login.go");

        let sid = &cps[1].session_ids[0];
        let s = other.store.load_session(sid).unwrap().unwrap();
        assert_eq!(s.session_hash, format!("wire:{sid}"));
        assert_eq!(s.user_email, EMAIL);
        assert_eq!(s.branch.as_deref(), Some("main"));
        assert_eq!(s.turns.len(), 5);
        assert!(s.turns.iter().all(|t| t.ts.is_none()));
        assert_eq!(s.tool_calls[0].tool, ToolCode::Read.name());
        assert_eq!(s.tool_calls[0].path.as_deref(), Some("login.go"));
        assert_eq!(s.tool_calls[2].cmd_prefix.as_deref(), Some("go test ./..."));
    }

    #[test]
    fn reimport_is_a_no_op() {
        let origin = Workspace::new();
        let mut git = dev_git();
        let (dict, body) = exported_wire(&origin, &mut git);

        // The exporting store already has every row.
        let stats = import_wire(&dict, &body, &origin.store, &mut SeqIdGen::new("I")).unwrap();
        assert_eq!(stats, ImportStats::default());

        let other = Workspace::new();
        let mut ids = SeqIdGen::new("I");
        import_wire(&dict, &body, &other.store, &mut ids).unwrap();
        let again = import_wire(&dict, &body, &other.store, &mut ids).unwrap();
        assert_eq!(again, ImportStats::default());
        assert_eq!(other.store.session_count().unwrap(), 2);
    }

    #[test]
    fn empty_inputs_import_nothing() {
        let ws = Workspace::new();
        let empty = WireState::empty();
        let dict = empty.dict.encode().unwrap();
        let mut ids = SeqIdGen::new("I");
        assert_eq!(import_wire(&dict, &empty.body, &ws.store, &mut ids).unwrap(), ImportStats::default());
        assert_eq!(import_wire(&[], b"RKLBODY\x01\x01garbage", &ws.store, &mut ids).unwrap(), ImportStats::default());
    }

    #[test]
    fn malformed_frame_is_skipped() {
        let origin = Workspace::new();
        let mut git = dev_git();
        let (dict, mut body) = exported_wire(&origin, &mut git);

        // Corrupt the first frame's payload; its siblings must still import.
        let first = scan_frames(&body).unwrap()[0];
        let start = first.payload_offset();
        for b in &mut body[start..start + first.compressed_len] {
            *b = 0xAA;
        }

        let other = Workspace::new();
        let stats = import_wire(&dict, &body, &other.store, &mut SeqIdGen::new("I")).unwrap();
        assert_eq!(stats.sessions, 1);
        assert_eq!(stats.checkpoints, 2);
        // The first checkpoint's only session never arrived, so it has no links.
        let cps = other.store.recent_checkpoints(10).unwrap();
        assert!(cps.iter().any(|c| c.session_ids.is_empty()));
    }

    #[test]
    fn unknown_frame_type_is_skipped() {
        let origin = Workspace::new();
        let mut git = dev_git();
        let (dict, body) = exported_wire(&origin, &mut git);

        // Splice a copy of the first Meta frame, retagged 0x42, between the
        // first Session and Checkpoint frames.
        let slices = scan_frames(&body).unwrap();
        let meta = slices[2];
        let mut foreign = body[meta.offset..meta.payload_offset() + meta.compressed_len].to_vec();
        foreign[0] = 0x42;
        let at = slices[1].offset;
        let mut spliced = body[..at].to_vec();
        spliced.extend_from_slice(&foreign);
        spliced.extend_from_slice(&body[at..]);

        let slices = scan_frames(&spliced).unwrap();
        assert_eq!(slices.len(), 7);
        assert_eq!(slices[1].tag, 0x42);
        let mut dec = FrameDecoder::for_body(&spliced).unwrap();
        assert!(matches!(
            dec.decode(&spliced, &slices[1]),
            Err(CodecError::UnknownFrameType(0x42))
        ));

        let other = Workspace::new();
        let stats = import_wire(&dict, &spliced, &other.store, &mut SeqIdGen::new("I")).unwrap();
        assert_eq!(stats, ImportStats { sessions: 2, checkpoints: 2 });
    }

    #[test]
    fn meta_only_body_imports_nothing() {
        let ws = Workspace::new();
        let mut dict = Dict::new();
        let email_ref = dict.lookup_or_add(Namespace::Emails, EMAIL);
        let mut body = rekal_codec::new_body_with_flags(FLAG_PRESET_DICT);
        let mut enc = FrameEncoder::for_body(&body, DEFAULT_LEVEL).unwrap();
        let meta = Frame::Meta(MetaFrame {
            format_version: FORMAT_VERSION,
            email_ref,
            checkpoint_sha: "0".repeat(40),
            timestamp: 0,
            n_sessions: 0,
            n_checkpoints: 0,
            n_frames: 1,
            n_dict_entries: 1,
        });
        body.extend_from_slice(&enc.encode(&meta).unwrap());

        let stats =
            import_wire(&dict.encode().unwrap(), &body, &ws.store, &mut SeqIdGen::new("I")).unwrap();
        assert_eq!(stats, ImportStats::default());
    }

    #[test]
    fn sync_pulls_a_teammates_branch() {
        let remote = MemoryRemote::shared();

        let alice_ws = Workspace::new();
        let mut alice = dev_git();
        alice.add_remote("origin", remote.clone());
        exported_wire(&alice_ws, &mut alice);
        push(&mut alice, "origin", BRANCH, false).unwrap();

        let bob_ws = Workspace::new();
        let mut bob = MemoryGit::new("/bob");
        bob.add_remote("origin", remote);
        let stats = import_remote_branches(
            &mut bob,
            &bob_ws.store,
            &mut SeqIdGen::new("I"),
            "origin",
            "rekal/",
        )
        .unwrap();
        assert_eq!(stats.sessions, 2);
        assert_eq!(bob_ws.store.checkpoint_count().unwrap(), 2);

        let again = import_remote_branches(
            &mut bob,
            &bob_ws.store,
            &mut SeqIdGen::new("J"),
            "origin",
            "rekal/",
        )
        .unwrap();
        assert_eq!(again, ImportStats::default());
    }

    #[test]
    fn sync_without_remote_is_a_no_op() {
        let ws = Workspace::new();
        let mut git = MemoryGit::new("/repo");
        let stats =
            import_remote_branches(&mut git, &ws.store, &mut SeqIdGen::new("I"), "origin", "rekal/")
                .unwrap();
        assert_eq!(stats, ImportStats::default());
    }
}
