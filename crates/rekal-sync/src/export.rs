use anyhow::Context;
use rekal_codec::{
    scan_frames, CheckpointFrame, CodecError, Dict, FileTouchedRecord, Frame, FrameEncoder,
    FrameType, MetaFrame, Namespace, PathRepr, SessionFrame, ToolCallRecord, TurnRecord,
    FORMAT_VERSION, MAX_EMAILS,
};
use rekal_core::ts::{now_unix, parse_rfc3339, rfc3339_to_unix};
use rekal_core::{CheckpointRecord, SessionRecord, ToolCode};
use rekal_git::{GitTransport, ZERO_OID};
use rekal_store::SqliteStore;
use tracing::{debug, info, warn};

use crate::wire::{WireState, CHECKPOINT_MESSAGE};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportOutcome {
    pub checkpoints: usize,
    pub sessions: usize,
    pub frames: usize,
    /// New tip of the portable branch, when anything was written.
    pub commit: Option<String>,
}

/// Append every unexported checkpoint to the portable branch.
///
/// For each checkpoint: Session frames for its sessions not yet on the wire,
/// then one Checkpoint frame. One Meta frame closes the batch. The
/// dictionary is rewritten in full, the body only grows, and the checkpoints
/// are marked exported once the branch ref has moved.
pub fn export(
    git: &mut dyn GitTransport,
    store: &SqliteStore,
    branch: &str,
    email: &str,
    level: i32,
) -> anyhow::Result<ExportOutcome> {
    let pending = store.unexported_checkpoints()?;
    if pending.is_empty() {
        return Ok(ExportOutcome::default());
    }

    let mut state = WireState::load(git, branch)?;
    let existing = scan_frames(&state.body).context("scan existing body")?;
    let mut n_checkpoints = existing
        .iter()
        .filter(|s| s.tag == FrameType::Checkpoint.as_byte())
        .count();
    let mut n_frames = existing.len();

    // The exporting author always gets an emails slot before any agent id.
    let author_ref = state.dict.lookup_or_add(Namespace::Emails, email);
    let mut enc = FrameEncoder::for_body(&state.body, level)?;
    let mut out = ExportOutcome::default();

    for cp in &pending {
        let mut session_refs = Vec::with_capacity(cp.session_ids.len());
        for sid in &cp.session_ids {
            if let Some(r) = state.dict.lookup(Namespace::Sessions, sid) {
                session_refs.push(r);
                continue;
            }
            let Some(session) = store.load_session(sid)? else {
                warn!(checkpoint = %cp.id, session = %sid, "linked session missing from store");
                continue;
            };
            let Some(bytes) = encode_session(&mut enc, &mut state.dict, &session)? else {
                continue;
            };
            state.body.extend_from_slice(&bytes);
            session_refs.push(state.dict.lookup_or_add(Namespace::Sessions, sid));
            out.sessions += 1;
            n_frames += 1;
        }

        let frame = Frame::Checkpoint(checkpoint_frame(&mut state.dict, cp, session_refs));
        state.body.extend_from_slice(&enc.encode(&frame)?);
        n_checkpoints += 1;
        n_frames += 1;
        out.checkpoints += 1;
    }

    let meta = Frame::Meta(MetaFrame {
        format_version: FORMAT_VERSION,
        email_ref: author_ref,
        checkpoint_sha: ZERO_OID.to_string(),
        timestamp: now_unix(),
        n_sessions: state.dict.len(Namespace::Sessions) as u64,
        n_checkpoints: n_checkpoints as u64,
        n_frames: n_frames as u64 + 1,
        n_dict_entries: state.dict.total_entries() as u64,
    });
    state.body.extend_from_slice(&enc.encode(&meta)?);
    out.frames = out.sessions + out.checkpoints + 1;

    let commit = state
        .commit(git, branch, CHECKPOINT_MESSAGE)
        .with_context(|| format!("commit to {branch}"))?;

    let ids: Vec<String> = pending.iter().map(|c| c.id.clone()).collect();
    store.mark_checkpoints_exported(&ids)?;

    info!(
        branch,
        commit = %commit,
        checkpoints = out.checkpoints,
        sessions = out.sessions,
        "exported to portable branch"
    );
    out.commit = Some(commit);
    Ok(out)
}

/// True when `err` comes from a v1 wire-format limit (a full dictionary
/// namespace or an unframeable payload) rather than from git or the store.
pub fn is_wire_limit(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<CodecError>(),
            Some(CodecError::Overflow { .. } | CodecError::PayloadTooLarge(_))
        )
    })
}

/// How much of a session goes into its frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Clip {
    /// Character budget for turn texts and command prefixes.
    text: Option<usize>,
    tools: usize,
    turns: usize,
}

impl Clip {
    fn full(s: &SessionRecord) -> Self {
        Self {
            text: None,
            tools: s.tool_calls.len(),
            turns: s.turns.len(),
        }
    }

    /// Halve the text budget first, then drop trailing tool calls, then
    /// trailing turns. `None` once nothing is left to cut.
    fn shrink(self, s: &SessionRecord) -> Option<Self> {
        let longest = s
            .turns
            .iter()
            .map(|t| t.content.chars().count())
            .chain(
                s.tool_calls
                    .iter()
                    .map(|c| c.cmd_prefix.as_deref().map_or(0, |p| p.chars().count())),
            )
            .max()
            .unwrap_or(0);
        let text = self.text.unwrap_or(longest);
        if text > 0 {
            Some(Self {
                text: Some(text / 2),
                ..self
            })
        } else if self.tools > 0 {
            Some(Self {
                tools: self.tools / 2,
                ..self
            })
        } else if self.turns > 0 {
            Some(Self {
                turns: self.turns / 2,
                ..self
            })
        } else {
            None
        }
    }
}

/// Encode a Session frame, shrinking it until the payload fits. A session
/// that cannot be framed at all is skipped with a warning.
fn encode_session(
    enc: &mut FrameEncoder,
    dict: &mut Dict,
    session: &SessionRecord,
) -> anyhow::Result<Option<Vec<u8>>> {
    let session_ref = dict.len(Namespace::Sessions) as u64;
    let mut clip = Clip::full(session);
    loop {
        let frame = Frame::Session(session_frame(dict, session, session_ref, clip));
        match enc.encode(&frame) {
            Ok(bytes) => return Ok(Some(bytes)),
            Err(CodecError::PayloadTooLarge(len)) => match clip.shrink(session) {
                Some(next) => {
                    debug!(session = %session.id, payload = len, ?next, "shrinking session frame");
                    clip = next;
                }
                None => {
                    warn!(session = %session.id, payload = len, "session does not fit in a frame, skipped");
                    return Ok(None);
                }
            },
            Err(e) => return Err(e.into()),
        }
    }
}

fn clip_text(text: &str, budget: Option<usize>) -> String {
    match budget {
        Some(n) => text.chars().take(n).collect(),
        None => text.to_string(),
    }
}

fn session_frame(dict: &mut Dict, s: &SessionRecord, session_ref: u64, clip: Clip) -> SessionFrame {
    let branch_ref = dict.lookup_or_add(Namespace::Branches, s.branch.as_deref().unwrap_or(""));
    let email_ref = dict.lookup_or_add(Namespace::Emails, &s.user_email);
    let agent_ref = intern_agent(dict, s.agent_id.as_deref());

    let mut turns = Vec::with_capacity(clip.turns);
    let mut prev: Option<i64> = None;
    for t in s.turns.iter().take(clip.turns) {
        let at = t.ts.as_deref().and_then(parse_rfc3339).map(|t| t.unix_timestamp());
        let ts_delta = match (prev, at) {
            (Some(p), Some(a)) if a > p => (a - p) as u64,
            _ => 0,
        };
        prev = at;
        turns.push(TurnRecord {
            role: t.role,
            ts_delta,
            branch_ref,
            text: clip_text(&t.content, clip.text),
        });
    }

    let tool_calls = s
        .tool_calls
        .iter()
        .take(clip.tools)
        .map(|c| ToolCallRecord {
            tool: ToolCode::from_name(&c.tool),
            path: match c.path.as_deref() {
                Some(p) if !p.is_empty() => PathRepr::Ref(dict.lookup_or_add(Namespace::Paths, p)),
                _ => PathRepr::Null,
            },
            cmd_prefix: clip_text(c.cmd_prefix.as_deref().unwrap_or_default(), clip.text),
        })
        .collect();

    SessionFrame {
        session_ref,
        captured_at: rfc3339_to_unix(&s.captured_at),
        email_ref,
        actor: s.actor,
        agent_ref,
        turns,
        tool_calls,
    }
}

/// Agent ids share the Emails namespace. Once its count byte is full a new
/// agent id is left out of the frame instead of overflowing the dictionary.
fn intern_agent(dict: &mut Dict, agent: Option<&str>) -> Option<u64> {
    let agent = agent?;
    if let Some(r) = dict.lookup(Namespace::Emails, agent) {
        return Some(r);
    }
    if dict.len(Namespace::Emails) >= MAX_EMAILS {
        warn!(agent, "emails dictionary full, agent ref dropped");
        return None;
    }
    Some(dict.lookup_or_add(Namespace::Emails, agent))
}

fn checkpoint_frame(dict: &mut Dict, cp: &CheckpointRecord, session_refs: Vec<u64>) -> CheckpointFrame {
    let branch_ref = dict.lookup_or_add(Namespace::Branches, &cp.git_branch);
    let email_ref = dict.lookup_or_add(Namespace::Emails, &cp.user_email);
    CheckpointFrame {
        checkpoint_id: cp.id.clone(),
        git_sha: cp.git_sha.clone(),
        branch_ref,
        email_ref,
        timestamp: rfc3339_to_unix(&cp.ts),
        actor: cp.actor,
        agent_ref: intern_agent(dict, cp.agent_id.as_deref()),
        session_refs,
        files: cp
            .files
            .iter()
            .map(|f| FileTouchedRecord {
                path_ref: dict.lookup_or_add(Namespace::Paths, &f.path),
                change_type: f.change_type,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::capture;
    use crate::test_support::*;
    use rekal_codec::{FrameDecoder, DEFAULT_LEVEL};
    use rekal_core::{ActorKind, Role, SeqIdGen, ToolCallRow, TurnRow};
    use rekal_git::MemoryGit;

    fn wire(git: &MemoryGit) -> WireState {
        WireState::load(git, BRANCH).unwrap()
    }

    fn frame_tags(body: &[u8]) -> Vec<u8> {
        scan_frames(body).unwrap().iter().map(|s| s.tag).collect()
    }

    #[test]
    fn two_checkpoints_append_three_frames_each() {
        let ws = Workspace::new();
        let mut git = dev_git();
        let mut ids = SeqIdGen::new("A");

        ws.write_transcript("s1.jsonl", SESSION_1);
        capture(&git, &ws.store, &ws.source(), &mut ids, EMAIL).unwrap();
        let out = export(&mut git, &ws.store, BRANCH, EMAIL, DEFAULT_LEVEL).unwrap();
        assert_eq!((out.sessions, out.checkpoints, out.frames), (1, 1, 3));

        let first = wire(&git);
        assert_eq!(frame_tags(&first.body), vec![1, 2, 3]);
        assert_eq!(first.dict.len(Namespace::Sessions), 1);

        ws.write_transcript("s2.jsonl", SESSION_2);
        capture(&git, &ws.store, &ws.source(), &mut ids, EMAIL).unwrap();
        export(&mut git, &ws.store, BRANCH, EMAIL, DEFAULT_LEVEL).unwrap();

        let second = wire(&git);
        assert_eq!(frame_tags(&second.body), vec![1, 2, 3, 1, 2, 3]);
        assert_eq!(second.dict.len(Namespace::Sessions), 2);
        assert!(second.body.starts_with(&first.body));
        assert!(ws.store.unexported_checkpoints().unwrap().is_empty());
    }

    #[test]
    fn frames_decode_against_the_dictionary() {
        let ws = Workspace::new();
        let mut git = dev_git();
        ws.write_transcript("s1.jsonl", SESSION_1);
        capture(&git, &ws.store, &ws.source(), &mut SeqIdGen::new("A"), EMAIL).unwrap();
        export(&mut git, &ws.store, BRANCH, EMAIL, DEFAULT_LEVEL).unwrap();

        let state = wire(&git);
        let slices = scan_frames(&state.body).unwrap();
        let mut dec = FrameDecoder::for_body(&state.body).unwrap();

        let Frame::Session(sf) = dec.decode(&state.body, &slices[0]).unwrap() else {
            panic!("expected a session frame");
        };
        assert_eq!(sf.turns.len(), 5);
        assert_eq!(sf.turns[0].ts_delta, 0);
        assert_eq!(sf.turns[1].ts_delta, 30);
        assert_eq!(state.dict.get(Namespace::Branches, sf.turns[0].branch_ref).unwrap(), "main");
        assert_eq!(state.dict.get(Namespace::Emails, sf.email_ref).unwrap(), EMAIL);
        assert_eq!(sf.tool_calls[0].tool, ToolCode::Read);
        assert_eq!(sf.tool_calls[2].path, PathRepr::Null);
        assert_eq!(sf.tool_calls[2].cmd_prefix, "go test ./...");

        let Frame::Checkpoint(cf) = dec.decode(&state.body, &slices[1]).unwrap() else {
            panic!("expected a checkpoint frame");
        };
        assert_eq!(cf.git_sha, HEAD_SHA);
        assert_eq!(cf.session_refs, vec![sf.session_ref]);
        assert_eq!(state.dict.get(Namespace::Paths, cf.files[0].path_ref).unwrap(), "login.go");

        let Frame::Meta(mf) = dec.decode(&state.body, &slices[2]).unwrap() else {
            panic!("expected a meta frame");
        };
        assert_eq!((mf.n_sessions, mf.n_checkpoints, mf.n_frames), (1, 1, 3));
    }

    #[test]
    fn nothing_pending_is_a_no_op() {
        let ws = Workspace::new();
        let mut git = MemoryGit::new("/repo");
        let out = export(&mut git, &ws.store, BRANCH, EMAIL, DEFAULT_LEVEL).unwrap();
        assert_eq!(out, ExportOutcome::default());
        assert!(git.resolve_ref(&format!("refs/heads/{BRANCH}")).unwrap().is_none());
    }

    fn stored_session(id: &str, agent: Option<&str>, calls: usize, prefix_len: usize) -> SessionRecord {
        SessionRecord {
            id: id.into(),
            session_hash: format!("h-{id}"),
            captured_at: "2026-02-25T10:00:00Z".into(),
            actor: if agent.is_some() { ActorKind::Agent } else { ActorKind::Human },
            agent_id: agent.map(str::to_string),
            user_email: EMAIL.into(),
            branch: Some("main".into()),
            turns: vec![TurnRow {
                id: format!("{id}-t"),
                role: Role::Human,
                content: "run the whole suite".into(),
                ts: None,
            }],
            tool_calls: (0..calls)
                .map(|i| {
                    let cmd = format!("cargo test --package member_{i:05} -- --nocapture ");
                    let mut prefix = format!("{cmd:x<prefix_len$}");
                    prefix.truncate(prefix_len);
                    ToolCallRow {
                        id: format!("{id}-c{i}"),
                        tool: "Bash".into(),
                        path: None,
                        cmd_prefix: Some(prefix),
                    }
                })
                .collect(),
        }
    }

    fn stored_checkpoint(id: &str, session_ids: &[&str]) -> CheckpointRecord {
        CheckpointRecord {
            id: id.into(),
            git_sha: HEAD_SHA.into(),
            git_branch: "main".into(),
            user_email: EMAIL.into(),
            ts: "2026-02-25T10:05:00Z".into(),
            actor: ActorKind::Human,
            agent_id: None,
            exported: false,
            files: vec![],
            session_ids: session_ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn oversized_turns_are_clipped_to_fit() {
        let mut dict = Dict::new();
        let mut enc = FrameEncoder::new(DEFAULT_LEVEL, 0).unwrap();
        let session = SessionRecord {
            id: "S0000000000000000000000001".into(),
            session_hash: "h".into(),
            captured_at: "2026-02-25T10:00:00Z".into(),
            actor: Default::default(),
            agent_id: None,
            user_email: EMAIL.into(),
            branch: None,
            turns: vec![TurnRow {
                id: "T1".into(),
                role: Role::Assistant,
                content: "x".repeat(200_000),
                ts: None,
            }],
            tool_calls: vec![],
        };
        let bytes = encode_session(&mut enc, &mut dict, &session).unwrap();
        assert!(bytes.is_some_and(|b| !b.is_empty()));
        assert_eq!(dict.get(Namespace::Branches, 0).unwrap(), "");
    }

    #[test]
    fn shrink_cuts_text_then_tool_calls_then_turns() {
        let s = stored_session("S0000000000000000000000001", None, 4, 3);
        let mut steps = vec![Clip::full(&s)];
        while let Some(next) = steps[steps.len() - 1].shrink(&s) {
            steps.push(next);
        }

        assert_eq!(steps[1].text, Some(9));
        let first_tool_cut = steps.iter().position(|c| c.tools < 4).unwrap();
        assert_eq!(steps[first_tool_cut - 1].text, Some(0));
        let first_turn_cut = steps.iter().position(|c| c.turns < 1).unwrap();
        assert_eq!(steps[first_turn_cut - 1].tools, 0);
        assert_eq!(
            steps[steps.len() - 1],
            Clip {
                text: Some(0),
                tools: 0,
                turns: 0
            }
        );
    }

    #[test]
    fn long_bash_session_is_shrunk_and_later_checkpoints_still_export() {
        let ws = Workspace::new();
        let mut git = dev_git();

        let heavy = stored_session("S0000000000000000000000001", None, 1_200, 80);
        ws.store.insert_session(&heavy).unwrap();
        ws.store
            .insert_checkpoint(&stored_checkpoint("C0000000000000000000000001", &[&heavy.id]))
            .unwrap();
        let out = export(&mut git, &ws.store, BRANCH, EMAIL, DEFAULT_LEVEL).unwrap();
        assert_eq!((out.sessions, out.checkpoints), (1, 1));

        let light = stored_session("S0000000000000000000000002", None, 1, 20);
        ws.store.insert_session(&light).unwrap();
        ws.store
            .insert_checkpoint(&stored_checkpoint("C0000000000000000000000002", &[&light.id]))
            .unwrap();
        let out = export(&mut git, &ws.store, BRANCH, EMAIL, DEFAULT_LEVEL).unwrap();
        assert_eq!((out.sessions, out.checkpoints), (1, 1));
        assert!(ws.store.unexported_checkpoints().unwrap().is_empty());

        let state = wire(&git);
        assert_eq!(frame_tags(&state.body), vec![1, 2, 3, 1, 2, 3]);
        let slices = scan_frames(&state.body).unwrap();
        let mut dec = FrameDecoder::for_body(&state.body).unwrap();
        let Frame::Session(sf) = dec.decode(&state.body, &slices[0]).unwrap() else {
            panic!("expected a session frame");
        };
        assert_eq!(sf.tool_calls.len(), 1_200);
        assert!(sf.tool_calls[0].cmd_prefix.chars().count() < 80);
        assert!(sf.tool_calls[0].cmd_prefix.starts_with("cargo test"));
    }

    #[test]
    fn agent_ids_beyond_the_emails_limit_are_dropped() {
        let ws = Workspace::new();
        let mut git = dev_git();

        let ids: Vec<String> = (1..=260).map(|i| format!("S{i:025}")).collect();
        for (i, id) in ids.iter().enumerate() {
            let agent = format!("agent-{i:03}");
            ws.store.insert_session(&stored_session(id, Some(&agent), 1, 10)).unwrap();
        }
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        ws.store
            .insert_checkpoint(&stored_checkpoint("C0000000000000000000000001", &refs))
            .unwrap();

        let out = export(&mut git, &ws.store, BRANCH, EMAIL, DEFAULT_LEVEL).unwrap();
        assert_eq!((out.sessions, out.checkpoints), (260, 1));
        assert!(ws.store.unexported_checkpoints().unwrap().is_empty());

        let state = wire(&git);
        assert_eq!(state.dict.len(Namespace::Emails), MAX_EMAILS);
        assert_eq!(state.dict.get(Namespace::Emails, 0).unwrap(), EMAIL);

        let slices = scan_frames(&state.body).unwrap();
        let mut dec = FrameDecoder::for_body(&state.body).unwrap();
        let Frame::Session(first) = dec.decode(&state.body, &slices[0]).unwrap() else {
            panic!("expected a session frame");
        };
        assert_eq!(state.dict.get(Namespace::Emails, first.agent_ref.unwrap()).unwrap(), "agent-000");
        let Frame::Session(last) = dec.decode(&state.body, &slices[259]).unwrap() else {
            panic!("expected a session frame");
        };
        assert_eq!(last.actor, ActorKind::Agent);
        assert_eq!(last.agent_ref, None);
    }

    #[test]
    fn wire_limits_are_recognised() {
        let mut dict = Dict::new();
        for i in 0..=MAX_EMAILS {
            dict.lookup_or_add(Namespace::Emails, &format!("dev{i}@example.com"));
        }
        let err = anyhow::Error::from(dict.encode().unwrap_err()).context("encode dictionary");
        assert!(is_wire_limit(&err));
        assert!(!is_wire_limit(&anyhow::anyhow!("git push failed")));
    }
}
