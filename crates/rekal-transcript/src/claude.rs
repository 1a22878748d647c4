//! Claude Code session transcripts.
//!
//! Claude Code writes one JSONL file per session under
//! `~/.claude/projects/<mangled repo path>/`, where the repo path has every
//! `/` and `.` replaced by `-`. Each line is a record such as:
//!
//! ```json
//! {"type":"assistant","message":{"content":[{"type":"text","text":"..."},
//!   {"type":"tool_use","name":"Edit","input":{"file_path":"src/lib.rs"}}]},
//!  "timestamp":"2026-02-25T10:00:30Z","gitBranch":"main"}
//! ```

use rekal_core::ts::{format_rfc3339, parse_rfc3339};
use rekal_core::{ActorKind, NotSupported, Role};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{ParseError, ParsedToolCall, ParsedTurn, SessionPayload, TranscriptSource};

const CMD_PREFIX_MAX_CHARS: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct ClaudeTranscripts {
    session_dir: Option<PathBuf>,
}

impl ClaudeTranscripts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read transcripts from `dir` instead of the per-repo directory under
    /// the home directory.
    pub fn with_session_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            session_dir: Some(dir.into()),
        }
    }

    /// Directory holding this repository's transcripts.
    pub fn session_dir(&self, git_root: &Path) -> anyhow::Result<PathBuf> {
        if let Some(dir) = &self.session_dir {
            return Ok(dir.clone());
        }
        let home = dirs::home_dir()
            .ok_or_else(|| NotSupported("no home directory to locate transcripts".into()))?;
        Ok(home
            .join(".claude")
            .join("projects")
            .join(project_dir_name(git_root)))
    }
}

/// `/home/me/my.repo` → `-home-me-my-repo`.
pub fn project_dir_name(git_root: &Path) -> String {
    git_root
        .to_string_lossy()
        .chars()
        .map(|c| if c == '/' || c == '\\' || c == '.' { '-' } else { c })
        .collect()
}

impl TranscriptSource for ClaudeTranscripts {
    fn session_files(&self, git_root: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let dir = self.session_dir(git_root)?;
        let entries = match std::fs::read_dir(&dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => anyhow::bail!("cannot read {}: {e}", dir.display()),
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().and_then(|x| x.to_str()) == Some("jsonl"))
            .collect();
        files.sort();
        Ok(files)
    }

    fn parse(&self, data: &[u8]) -> Result<SessionPayload, ParseError> {
        parse_jsonl(data)
    }
}

pub fn parse_jsonl(data: &[u8]) -> Result<SessionPayload, ParseError> {
    let text = std::str::from_utf8(data).map_err(|_| ParseError::NotUtf8)?;
    let mut payload = SessionPayload::default();
    let mut records = 0usize;

    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                debug!(line = lineno + 1, error = %e, "skipping non-JSON transcript line");
                continue;
            }
        };
        records += 1;

        if payload.branch.is_none() {
            if let Some(b) = str_field(&record, "gitBranch") {
                payload.branch = Some(b.to_string());
            }
        }
        if payload.agent_id.is_none() {
            if let Some(a) = str_field(&record, "agentId") {
                payload.actor = ActorKind::Agent;
                payload.agent_id = Some(a.to_string());
            }
        }

        let role = match record.get("type").and_then(Value::as_str) {
            Some("user") => Role::Human,
            Some("assistant") => Role::Assistant,
            _ => continue,
        };
        let timestamp = record
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(parse_rfc3339)
            .map(format_rfc3339);

        let content = record.get("message").and_then(|m| m.get("content"));
        let mut texts: Vec<&str> = Vec::new();
        match content {
            Some(Value::String(s)) => texts.push(s),
            Some(Value::Array(blocks)) => {
                for block in blocks {
                    match block.get("type").and_then(Value::as_str) {
                        Some("text") => {
                            if let Some(t) = block.get("text").and_then(Value::as_str) {
                                texts.push(t);
                            }
                        }
                        Some("tool_use") => {
                            if let Some(call) = tool_call(block) {
                                payload.tool_calls.push(call);
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }

        let joined = texts.join("\n");
        if !joined.trim().is_empty() {
            payload.turns.push(ParsedTurn {
                role,
                content: joined,
                timestamp,
            });
        }
    }

    if records == 0 {
        return Err(ParseError::NoRecords);
    }
    Ok(payload)
}

fn str_field<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn tool_call(block: &Value) -> Option<ParsedToolCall> {
    let name = block.get("name").and_then(Value::as_str)?;
    let input = block.get("input");
    let path = input.and_then(|i| {
        ["file_path", "path", "notebook_path"]
            .iter()
            .find_map(|k| str_field(i, k))
            .map(String::from)
    });
    let cmd_prefix = input
        .and_then(|i| str_field(i, "command"))
        .and_then(|c| c.lines().next())
        .map(|first| first.chars().take(CMD_PREFIX_MAX_CHARS).collect::<String>());
    Some(ParsedToolCall {
        tool: name.to_string(),
        path,
        cmd_prefix,
    })
}
