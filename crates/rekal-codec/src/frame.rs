//! Frame payloads, before compression.
//!
//! Integers are LEB128 varints, strings are varint-length-prefixed UTF-8 and
//! timestamps are whole seconds since the Unix epoch. Fields that name a
//! dictionary entry hold its index.

use rekal_core::{ActorKind, ChangeType, Role, ToolCode};

use crate::body::FrameType;
use crate::error::CodecError;
use crate::wire::{Reader, Writer};

/// Version written into Meta frames.
pub const FORMAT_VERSION: u8 = 0x01;

const CHECKPOINT_ID_LEN: usize = 26;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRecord {
    pub role: Role,
    /// Seconds since the previous turn; 0 for the first or when unknown.
    pub ts_delta: u64,
    pub branch_ref: u64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRepr {
    Null,
    Ref(u64),
    Inline(String),
}

impl PathRepr {
    fn flag(&self) -> u8 {
        match self {
            PathRepr::Null => 0,
            PathRepr::Ref(_) => 1,
            PathRepr::Inline(_) => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRecord {
    pub tool: ToolCode,
    pub path: PathRepr,
    pub cmd_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFrame {
    pub session_ref: u64,
    pub captured_at: u64,
    pub email_ref: u64,
    pub actor: ActorKind,
    pub agent_ref: Option<u64>,
    pub turns: Vec<TurnRecord>,
    pub tool_calls: Vec<ToolCallRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTouchedRecord {
    pub path_ref: u64,
    pub change_type: ChangeType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointFrame {
    /// Store identifier of the checkpoint, written inline (26 bytes, NUL
    /// padded) so the Sessions namespace holds sessions only.
    pub checkpoint_id: String,
    pub git_sha: String,
    pub branch_ref: u64,
    pub email_ref: u64,
    pub timestamp: u64,
    pub actor: ActorKind,
    pub agent_ref: Option<u64>,
    pub session_refs: Vec<u64>,
    pub files: Vec<FileTouchedRecord>,
}

/// Advisory running totals. Never authoritative; import ignores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaFrame {
    pub format_version: u8,
    pub email_ref: u64,
    pub checkpoint_sha: String,
    pub timestamp: u64,
    pub n_sessions: u64,
    pub n_checkpoints: u64,
    pub n_frames: u64,
    pub n_dict_entries: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Session(SessionFrame),
    Checkpoint(CheckpointFrame),
    Meta(MetaFrame),
    /// Reserved. The payload is carried opaquely.
    Tombstone(Vec<u8>),
}

impl Frame {
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Session(_) => FrameType::Session,
            Frame::Checkpoint(_) => FrameType::Checkpoint,
            Frame::Meta(_) => FrameType::Meta,
            Frame::Tombstone(_) => FrameType::Tombstone,
        }
    }

    /// Serialize to the uncompressed payload.
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut w = Writer::new();
        match self {
            Frame::Session(f) => encode_session(&mut w, f),
            Frame::Checkpoint(f) => encode_checkpoint(&mut w, f),
            Frame::Meta(f) => encode_meta(&mut w, f),
            Frame::Tombstone(raw) => w.bytes(raw),
        }
        w.finish()
    }

    pub fn decode_payload(frame_type: FrameType, payload: &[u8]) -> Result<Frame, CodecError> {
        match frame_type {
            FrameType::Session => {
                let mut r = Reader::new(payload, "session frame");
                let f = decode_session(&mut r)?;
                r.finish()?;
                Ok(Frame::Session(f))
            }
            FrameType::Checkpoint => {
                let mut r = Reader::new(payload, "checkpoint frame");
                let f = decode_checkpoint(&mut r)?;
                r.finish()?;
                Ok(Frame::Checkpoint(f))
            }
            FrameType::Meta => {
                let mut r = Reader::new(payload, "meta frame");
                let f = decode_meta(&mut r)?;
                r.finish()?;
                Ok(Frame::Meta(f))
            }
            FrameType::Tombstone => Ok(Frame::Tombstone(payload.to_vec())),
        }
    }
}

fn put_actor(w: &mut Writer, actor: ActorKind, agent_ref: Option<u64>) {
    w.u8(actor.as_byte());
    match agent_ref {
        Some(r) => {
            w.u8(1);
            w.varint(r);
        }
        None => w.u8(0),
    }
}

fn get_actor(r: &mut Reader<'_>, what: &'static str) -> Result<(ActorKind, Option<u64>), CodecError> {
    let raw = r.u8()?;
    let actor = ActorKind::from_byte(raw).ok_or(CodecError::InvalidValue {
        what,
        field: "actor",
        value: raw.into(),
    })?;
    let agent_ref = match r.u8()? {
        0 => None,
        1 => Some(r.varint()?),
        other => {
            return Err(CodecError::InvalidValue {
                what,
                field: "has_agent",
                value: other.into(),
            })
        }
    };
    Ok((actor, agent_ref))
}

fn encode_session(w: &mut Writer, f: &SessionFrame) {
    w.varint(f.session_ref);
    w.varint(f.captured_at);
    w.varint(f.email_ref);
    put_actor(w, f.actor, f.agent_ref);

    w.len_usize(f.turns.len());
    for t in &f.turns {
        w.u8(t.role.as_byte());
        w.varint(t.ts_delta);
        w.varint(t.branch_ref);
        w.str(&t.text);
    }

    w.len_usize(f.tool_calls.len());
    for tc in &f.tool_calls {
        w.u8(tc.tool.as_u8());
        w.u8(tc.path.flag());
        match &tc.path {
            PathRepr::Null => {}
            PathRepr::Ref(r) => w.varint(*r),
            PathRepr::Inline(p) => w.str(p),
        }
        w.str(&tc.cmd_prefix);
    }
}

fn decode_session(r: &mut Reader<'_>) -> Result<SessionFrame, CodecError> {
    const WHAT: &str = "session frame";
    let session_ref = r.varint()?;
    let captured_at = r.varint()?;
    let email_ref = r.varint()?;
    let (actor, agent_ref) = get_actor(r, WHAT)?;

    let n_turns = r.len_usize()?;
    let mut turns = Vec::with_capacity(n_turns);
    for _ in 0..n_turns {
        let raw = r.u8()?;
        let role = Role::from_byte(raw).ok_or(CodecError::InvalidValue {
            what: WHAT,
            field: "role",
            value: raw.into(),
        })?;
        turns.push(TurnRecord {
            role,
            ts_delta: r.varint()?,
            branch_ref: r.varint()?,
            text: r.string()?,
        });
    }

    let n_tools = r.len_usize()?;
    let mut tool_calls = Vec::with_capacity(n_tools);
    for _ in 0..n_tools {
        let tool = ToolCode::from_u8(r.u8()?);
        let path = match r.u8()? {
            0 => PathRepr::Null,
            1 => PathRepr::Ref(r.varint()?),
            2 => PathRepr::Inline(r.string()?),
            other => {
                return Err(CodecError::InvalidValue {
                    what: WHAT,
                    field: "path_flag",
                    value: other.into(),
                })
            }
        };
        tool_calls.push(ToolCallRecord {
            tool,
            path,
            cmd_prefix: r.string()?,
        });
    }

    Ok(SessionFrame {
        session_ref,
        captured_at,
        email_ref,
        actor,
        agent_ref,
        turns,
        tool_calls,
    })
}

fn encode_checkpoint(w: &mut Writer, f: &CheckpointFrame) {
    let mut id = [0u8; CHECKPOINT_ID_LEN];
    let n = f.checkpoint_id.len().min(CHECKPOINT_ID_LEN);
    id[..n].copy_from_slice(&f.checkpoint_id.as_bytes()[..n]);
    w.bytes(&id);
    w.str(&f.git_sha);
    w.varint(f.branch_ref);
    w.varint(f.email_ref);
    w.varint(f.timestamp);
    put_actor(w, f.actor, f.agent_ref);

    w.len_usize(f.session_refs.len());
    for r in &f.session_refs {
        w.varint(*r);
    }
    w.len_usize(f.files.len());
    for file in &f.files {
        w.varint(file.path_ref);
        w.u8(file.change_type.as_byte());
    }
}

fn decode_checkpoint(r: &mut Reader<'_>) -> Result<CheckpointFrame, CodecError> {
    const WHAT: &str = "checkpoint frame";
    let raw_id = r.bytes(CHECKPOINT_ID_LEN)?;
    let end = raw_id.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    let checkpoint_id =
        String::from_utf8(raw_id[..end].to_vec()).map_err(|_| CodecError::InvalidUtf8(WHAT))?;
    let git_sha = r.string()?;
    let branch_ref = r.varint()?;
    let email_ref = r.varint()?;
    let timestamp = r.varint()?;
    let (actor, agent_ref) = get_actor(r, WHAT)?;

    let n_refs = r.len_usize()?;
    let mut session_refs = Vec::with_capacity(n_refs);
    for _ in 0..n_refs {
        session_refs.push(r.varint()?);
    }
    let n_files = r.len_usize()?;
    let mut files = Vec::with_capacity(n_files);
    for _ in 0..n_files {
        files.push(FileTouchedRecord {
            path_ref: r.varint()?,
            change_type: ChangeType::from_byte(r.u8()?),
        });
    }

    Ok(CheckpointFrame {
        checkpoint_id,
        git_sha,
        branch_ref,
        email_ref,
        timestamp,
        actor,
        agent_ref,
        session_refs,
        files,
    })
}

fn encode_meta(w: &mut Writer, f: &MetaFrame) {
    w.u8(f.format_version);
    w.varint(f.email_ref);
    w.str(&f.checkpoint_sha);
    w.varint(f.timestamp);
    w.varint(f.n_sessions);
    w.varint(f.n_checkpoints);
    w.varint(f.n_frames);
    w.varint(f.n_dict_entries);
}

fn decode_meta(r: &mut Reader<'_>) -> Result<MetaFrame, CodecError> {
    Ok(MetaFrame {
        format_version: r.u8()?,
        email_ref: r.varint()?,
        checkpoint_sha: r.string()?,
        timestamp: r.varint()?,
        n_sessions: r.varint()?,
        n_checkpoints: r.varint()?,
        n_frames: r.varint()?,
        n_dict_entries: r.varint()?,
    })
}
