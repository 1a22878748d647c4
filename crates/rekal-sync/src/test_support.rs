use rekal_core::NotSupported;
use rekal_git::MemoryGit;
use rekal_store::SqliteStore;
use rekal_transcript::{ClaudeTranscripts, ParseError, SessionPayload, TranscriptSource};
use std::path::{Path, PathBuf};

pub const EMAIL: &str = "dev@example.com";
pub const BRANCH: &str = "rekal/dev@example.com";
pub const HEAD_SHA: &str = "1111111111111111111111111111111111111111";

pub const SESSION_1: &str = r#"{"type":"summary","sessionId":"test-session-001"}
{"type":"user","message":{"role":"user","content":[{"type":"text","text":"fix the auth bug in login.go"}]},"timestamp":"2026-02-25T10:00:00Z","gitBranch":"main"}
{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"Let me read the file first."},{"type":"tool_use","id":"tu-1","name":"Read","input":{"file_path":"login.go"}}]},"timestamp":"2026-02-25T10:00:30Z"}
{"type":"tool_result","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"tu-1","content":"package main"}]}}
{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"I see the issue. Let me fix it."},{"type":"tool_use","id":"tu-2","name":"Edit","input":{"file_path":"login.go"}}]},"timestamp":"2026-02-25T10:01:00Z"}
{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"Fixed. Running tests."},{"type":"tool_use","id":"tu-3","name":"Bash","input":{"command":"go test ./..."}}]},"timestamp":"2026-02-25T10:01:30Z"}
{"type":"user","message":{"role":"user","content":[{"type":"text","text":"looks good, thanks"}]},"timestamp":"2026-02-25T10:02:00Z"}
"#;

pub const SESSION_2: &str = r#"{"type":"summary","sessionId":"test-session-002"}
{"type":"user","message":{"role":"user","content":[{"type":"text","text":"add logging to the server"}]},"timestamp":"2026-02-25T11:00:00Z","gitBranch":"feature/logging"}
{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"Adding a request logger."},{"type":"tool_use","id":"tu-9","name":"Edit","input":{"file_path":"server.go"}}]},"timestamp":"2026-02-25T11:00:20Z"}
{"type":"user","message":{"role":"user","content":[{"type":"text","text":"perfect"}]},"timestamp":"2026-02-25T11:01:00Z"}
"#;

/// A temporary store plus a transcript directory.
pub struct Workspace {
    pub store: SqliteStore,
    pub transcripts: PathBuf,
    _dir: tempfile::TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open_or_create(&dir.path().join("data.db")).unwrap();
        let transcripts = dir.path().join("transcripts");
        std::fs::create_dir_all(&transcripts).unwrap();
        Self {
            store,
            transcripts,
            _dir: dir,
        }
    }

    pub fn write_transcript(&self, name: &str, content: &str) {
        std::fs::write(self.transcripts.join(name), content).unwrap();
    }

    pub fn source(&self) -> ClaudeTranscripts {
        ClaudeTranscripts::with_session_dir(&self.transcripts)
    }
}

/// Repository on `main` at [`HEAD_SHA`] whose last commit modified login.go.
pub fn dev_git() -> MemoryGit {
    let mut git = MemoryGit::new("/repo");
    git.set_head(HEAD_SHA, "main");
    git.set_changes(&[("M", "login.go")]);
    git.set_config("user.email", EMAIL);
    git
}

/// A source on a platform without transcripts.
pub struct Unsupported;

impl TranscriptSource for Unsupported {
    fn session_files(&self, _git_root: &Path) -> anyhow::Result<Vec<PathBuf>> {
        Err(NotSupported("no transcripts here".into()).into())
    }

    fn parse(&self, _data: &[u8]) -> Result<SessionPayload, ParseError> {
        Err(ParseError::NoRecords)
    }
}
