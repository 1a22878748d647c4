pub mod claude;

pub use claude::ClaudeTranscripts;

use rekal_core::{ActorKind, Role};
use std::path::{Path, PathBuf};

/// One conversation turn as read from a transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTurn {
    pub role: Role,
    pub content: String,
    /// RFC 3339, when the record carried a parsable timestamp.
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedToolCall {
    pub tool: String,
    pub path: Option<String>,
    pub cmd_prefix: Option<String>,
}

/// Structured content of one transcript file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPayload {
    pub actor: ActorKind,
    pub agent_id: Option<String>,
    pub branch: Option<String>,
    pub turns: Vec<ParsedTurn>,
    pub tool_calls: Vec<ParsedToolCall>,
}

impl SessionPayload {
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty() && self.tool_calls.is_empty()
    }
}

/// Per-file failure. Capture skips the file and carries on.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("transcript is not valid UTF-8")]
    NotUtf8,
    #[error("transcript has no parsable records")]
    NoRecords,
}

/// Where transcripts come from and how they are read.
pub trait TranscriptSource {
    /// Candidate transcript files for the repository at `git_root`, in a
    /// stable order. A missing directory is an empty list, not an error.
    fn session_files(&self, git_root: &Path) -> anyhow::Result<Vec<PathBuf>>;

    fn read(&self, path: &Path) -> anyhow::Result<Vec<u8>> {
        Ok(std::fs::read(path)?)
    }

    fn parse(&self, data: &[u8]) -> Result<SessionPayload, ParseError>;
}
