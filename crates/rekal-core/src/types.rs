use serde::{Deserialize, Serialize};
use std::fmt;

/// Who drove a session: a person at the keyboard or an autonomous agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    #[default]
    Human,
    Agent,
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorKind::Human => "human",
            ActorKind::Agent => "agent",
        }
    }

    /// Lenient: anything other than `"agent"` is treated as human.
    pub fn parse(s: &str) -> Self {
        match s {
            "agent" => ActorKind::Agent,
            _ => ActorKind::Human,
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            ActorKind::Human => 0,
            ActorKind::Agent => 1,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(ActorKind::Human),
            1 => Some(ActorKind::Agent),
            _ => None,
        }
    }
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Speaker of a single conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Human,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Human => "human",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "human" | "user" => Some(Role::Human),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            Role::Human => 0,
            Role::Assistant => 1,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Role::Human),
            1 => Some(Role::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a file changed in the checkpointed commit, from `git diff --name-status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
    Renamed,
    /// Any other status letter (copied, type change, unmerged, ...), kept raw.
    Other(u8),
}

impl ChangeType {
    /// Map a name-status column such as `M`, `A` or `R100`.
    pub fn from_status(status: &str) -> Self {
        match status.as_bytes().first() {
            Some(b) => Self::from_byte(*b),
            None => ChangeType::Other(b'?'),
        }
    }

    pub fn from_byte(b: u8) -> Self {
        match b {
            b'A' => ChangeType::Added,
            b'M' => ChangeType::Modified,
            b'D' => ChangeType::Deleted,
            b'R' => ChangeType::Renamed,
            other => ChangeType::Other(other),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            ChangeType::Added => b'A',
            ChangeType::Modified => b'M',
            ChangeType::Deleted => b'D',
            ChangeType::Renamed => b'R',
            ChangeType::Other(b) => *b,
        }
    }

    /// Single-letter form stored in `files_touched.change_type`.
    pub fn as_status(&self) -> String {
        char::from(self.as_byte()).to_string()
    }
}

/// Compact tool identifier carried in Session frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolCode {
    Other,
    Read,
    Edit,
    Write,
    Bash,
    Grep,
    Glob,
    Task,
    WebFetch,
    WebSearch,
    NotebookEdit,
    TodoWrite,
}

const TOOL_TABLE: [(ToolCode, &str); 12] = [
    (ToolCode::Other, "Other"),
    (ToolCode::Read, "Read"),
    (ToolCode::Edit, "Edit"),
    (ToolCode::Write, "Write"),
    (ToolCode::Bash, "Bash"),
    (ToolCode::Grep, "Grep"),
    (ToolCode::Glob, "Glob"),
    (ToolCode::Task, "Task"),
    (ToolCode::WebFetch, "WebFetch"),
    (ToolCode::WebSearch, "WebSearch"),
    (ToolCode::NotebookEdit, "NotebookEdit"),
    (ToolCode::TodoWrite, "TodoWrite"),
];

impl ToolCode {
    pub fn from_name(name: &str) -> Self {
        TOOL_TABLE
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(code, _)| *code)
            .unwrap_or(ToolCode::Other)
    }

    pub fn name(&self) -> &'static str {
        TOOL_TABLE[self.as_u8() as usize].1
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Unknown codes decode as `Other` so newer writers stay readable.
    pub fn from_u8(code: u8) -> Self {
        TOOL_TABLE
            .get(code as usize)
            .map(|(c, _)| *c)
            .unwrap_or(ToolCode::Other)
    }
}

// ── Store rows ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRow {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// RFC 3339, when the transcript carried one.
    pub ts: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRow {
    pub id: String,
    pub tool: String,
    pub path: Option<String>,
    pub cmd_prefix: Option<String>,
}

/// A captured session with its turns and tool calls, in transcript order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: String,
    pub session_hash: String,
    pub captured_at: String,
    pub actor: ActorKind,
    pub agent_id: Option<String>,
    pub user_email: String,
    pub branch: Option<String>,
    pub turns: Vec<TurnRow>,
    pub tool_calls: Vec<ToolCallRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTouchedRow {
    pub id: String,
    pub path: String,
    pub change_type: ChangeType,
}

/// "These sessions were captured as of this commit."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointRecord {
    pub id: String,
    pub git_sha: String,
    pub git_branch: String,
    pub user_email: String,
    pub ts: String,
    pub actor: ActorKind,
    pub agent_id: Option<String>,
    pub exported: bool,
    pub files: Vec<FileTouchedRow>,
    pub session_ids: Vec<String>,
}
