//! SQLite-backed Authoritative Store.
//!
//! Rows are inserted once and never rewritten, except for the `exported`
//! flag on checkpoints, which records whether push has published them to the
//! wire log.

use rekal_core::{
    ActorKind, ChangeType, CheckpointRecord, FileTouchedRow, Role, SessionRecord, ToolCallRow,
    TurnRow,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::debug;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    rowid INTEGER PRIMARY KEY,
    id TEXT UNIQUE NOT NULL,
    session_hash TEXT NOT NULL,
    captured_at TEXT NOT NULL,
    actor_type TEXT NOT NULL DEFAULT 'human',
    agent_id TEXT,
    user_email TEXT NOT NULL DEFAULT '',
    branch TEXT
);
CREATE INDEX IF NOT EXISTS idx_sessions_hash ON sessions(session_hash);

CREATE TABLE IF NOT EXISTS turns (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES sessions(id),
    turn_index INTEGER NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    ts TEXT
);
CREATE INDEX IF NOT EXISTS idx_turns_session ON turns(session_id, turn_index);

CREATE TABLE IF NOT EXISTS tool_calls (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES sessions(id),
    call_order INTEGER NOT NULL,
    tool TEXT NOT NULL,
    path TEXT,
    cmd_prefix TEXT
);
CREATE INDEX IF NOT EXISTS idx_tool_calls_session ON tool_calls(session_id, call_order);

CREATE TABLE IF NOT EXISTS checkpoints (
    rowid INTEGER PRIMARY KEY,
    id TEXT UNIQUE NOT NULL,
    git_sha TEXT NOT NULL,
    git_branch TEXT NOT NULL,
    user_email TEXT NOT NULL,
    ts TEXT NOT NULL,
    actor_type TEXT NOT NULL DEFAULT 'human',
    agent_id TEXT,
    exported BOOLEAN NOT NULL DEFAULT FALSE
);
CREATE INDEX IF NOT EXISTS idx_checkpoints_unexported ON checkpoints(exported) WHERE exported = FALSE;

CREATE TABLE IF NOT EXISTS files_touched (
    id TEXT PRIMARY KEY,
    checkpoint_id TEXT NOT NULL REFERENCES checkpoints(id),
    file_index INTEGER NOT NULL,
    file_path TEXT NOT NULL,
    change_type TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS checkpoint_sessions (
    checkpoint_id TEXT NOT NULL REFERENCES checkpoints(id),
    session_id TEXT NOT NULL REFERENCES sessions(id),
    link_order INTEGER NOT NULL,
    PRIMARY KEY (checkpoint_id, session_id)
);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

const SCHEMA_VERSION: &str = "1";

/// SQLite-backed storage engine.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open an existing data.db.
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        if !db_path.is_file() {
            anyhow::bail!("data store not found at {}", db_path.display());
        }
        let conn = Connection::open(db_path)?;
        let store = Self { conn };
        store.apply_pragmas()?;
        Ok(store)
    }

    /// Open or create data.db with full schema.
    pub fn open_or_create(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        let store = Self { conn };
        store.apply_pragmas()?;
        store.apply_schema()?;
        debug!(path = %db_path.display(), "store ready");
        Ok(store)
    }

    fn apply_pragmas(&self) -> anyhow::Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    fn apply_schema(&self) -> anyhow::Result<()> {
        self.conn.execute_batch(SCHEMA_SQL)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('version', ?1)",
            params![SCHEMA_VERSION],
        )?;
        Ok(())
    }

    pub fn schema_version(&self) -> anyhow::Result<Option<String>> {
        let v = self
            .conn
            .query_row(
                "SELECT value FROM schema_meta WHERE key = 'version'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(v)
    }

    // ── Sessions ────────────────────────────────────────────────────

    /// Dedup check for capture: has a transcript with this content hash been
    /// stored already?
    pub fn session_exists_by_hash(&self, hash: &str) -> anyhow::Result<bool> {
        self.exists("SELECT 1 FROM sessions WHERE session_hash = ?1 LIMIT 1", hash)
    }

    pub fn session_exists(&self, id: &str) -> anyhow::Result<bool> {
        self.exists("SELECT 1 FROM sessions WHERE id = ?1", id)
    }

    /// Insert a session with its turns and tool calls in one transaction.
    pub fn insert_session(&self, s: &SessionRecord) -> anyhow::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO sessions
             (id, session_hash, captured_at, actor_type, agent_id, user_email, branch)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                s.id,
                s.session_hash,
                s.captured_at,
                s.actor.as_str(),
                s.agent_id,
                s.user_email,
                s.branch,
            ],
        )?;
        for (i, t) in s.turns.iter().enumerate() {
            tx.execute(
                "INSERT INTO turns (id, session_id, turn_index, role, content, ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![t.id, s.id, i as i64, t.role.as_str(), t.content, t.ts],
            )?;
        }
        for (i, tc) in s.tool_calls.iter().enumerate() {
            tx.execute(
                "INSERT INTO tool_calls (id, session_id, call_order, tool, path, cmd_prefix)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![tc.id, s.id, i as i64, tc.tool, tc.path, tc.cmd_prefix],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_session(&self, id: &str) -> anyhow::Result<Option<SessionRecord>> {
        let head = self
            .conn
            .query_row(
                "SELECT id, session_hash, captured_at, actor_type, agent_id, user_email, branch
                 FROM sessions WHERE id = ?1",
                params![id],
                |row| {
                    let actor: String = row.get(3)?;
                    Ok(SessionRecord {
                        id: row.get(0)?,
                        session_hash: row.get(1)?,
                        captured_at: row.get(2)?,
                        actor: ActorKind::parse(&actor),
                        agent_id: row.get(4)?,
                        user_email: row.get(5)?,
                        branch: row.get(6)?,
                        turns: Vec::new(),
                        tool_calls: Vec::new(),
                    })
                },
            )
            .optional()?;
        let Some(mut session) = head else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT id, role, content, ts FROM turns WHERE session_id = ?1 ORDER BY turn_index",
        )?;
        let turns = stmt
            .query_map(params![id], |row| {
                let role: String = row.get(1)?;
                Ok(TurnRow {
                    id: row.get(0)?,
                    role: Role::parse(&role).unwrap_or(Role::Human),
                    content: row.get(2)?,
                    ts: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT id, tool, path, cmd_prefix FROM tool_calls
             WHERE session_id = ?1 ORDER BY call_order",
        )?;
        let tool_calls = stmt
            .query_map(params![id], |row| {
                Ok(ToolCallRow {
                    id: row.get(0)?,
                    tool: row.get(1)?,
                    path: row.get(2)?,
                    cmd_prefix: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        session.turns = turns;
        session.tool_calls = tool_calls;
        Ok(Some(session))
    }

    pub fn session_count(&self) -> anyhow::Result<u64> {
        self.count("SELECT COUNT(*) FROM sessions")
    }

    // ── Checkpoints ─────────────────────────────────────────────────

    pub fn checkpoint_exists(&self, id: &str) -> anyhow::Result<bool> {
        self.exists("SELECT 1 FROM checkpoints WHERE id = ?1", id)
    }

    /// Insert a checkpoint with its files and session links in one
    /// transaction. Every linked session must already exist.
    pub fn insert_checkpoint(&self, c: &CheckpointRecord) -> anyhow::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO checkpoints
             (id, git_sha, git_branch, user_email, ts, actor_type, agent_id, exported)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                c.id,
                c.git_sha,
                c.git_branch,
                c.user_email,
                c.ts,
                c.actor.as_str(),
                c.agent_id,
                c.exported,
            ],
        )?;
        for (i, f) in c.files.iter().enumerate() {
            tx.execute(
                "INSERT INTO files_touched (id, checkpoint_id, file_index, file_path, change_type)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![f.id, c.id, i as i64, f.path, f.change_type.as_status()],
            )?;
        }
        for (i, sid) in c.session_ids.iter().enumerate() {
            tx.execute(
                "INSERT OR IGNORE INTO checkpoint_sessions (checkpoint_id, session_id, link_order)
                 VALUES (?1, ?2, ?3)",
                params![c.id, sid, i as i64],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Checkpoints push still has to publish, oldest first.
    pub fn unexported_checkpoints(&self) -> anyhow::Result<Vec<CheckpointRecord>> {
        self.query_checkpoints(
            "SELECT id, git_sha, git_branch, user_email, ts, actor_type, agent_id, exported
             FROM checkpoints WHERE exported = FALSE ORDER BY rowid",
            None,
        )
    }

    /// Most recent checkpoints first.
    pub fn recent_checkpoints(&self, limit: usize) -> anyhow::Result<Vec<CheckpointRecord>> {
        self.query_checkpoints(
            "SELECT id, git_sha, git_branch, user_email, ts, actor_type, agent_id, exported
             FROM checkpoints ORDER BY rowid DESC LIMIT ?1",
            Some(limit as i64),
        )
    }

    pub fn mark_checkpoints_exported(&self, ids: &[String]) -> anyhow::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for id in ids {
            tx.execute(
                "UPDATE checkpoints SET exported = TRUE WHERE id = ?1",
                params![id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn checkpoint_count(&self) -> anyhow::Result<u64> {
        self.count("SELECT COUNT(*) FROM checkpoints")
    }

    fn query_checkpoints(
        &self,
        sql: &str,
        limit: Option<i64>,
    ) -> anyhow::Result<Vec<CheckpointRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<CheckpointRecord> {
            let actor: String = row.get(5)?;
            Ok(CheckpointRecord {
                id: row.get(0)?,
                git_sha: row.get(1)?,
                git_branch: row.get(2)?,
                user_email: row.get(3)?,
                ts: row.get(4)?,
                actor: ActorKind::parse(&actor),
                agent_id: row.get(6)?,
                exported: row.get(7)?,
                files: Vec::new(),
                session_ids: Vec::new(),
            })
        };
        let mut rows = match limit {
            Some(n) => stmt.query_map(params![n], map_row)?.collect::<Result<Vec<_>, _>>()?,
            None => stmt.query_map([], map_row)?.collect::<Result<Vec<_>, _>>()?,
        };
        for c in &mut rows {
            c.files = self.checkpoint_files(&c.id)?;
            c.session_ids = self.checkpoint_session_ids(&c.id)?;
        }
        Ok(rows)
    }

    fn checkpoint_files(&self, checkpoint_id: &str) -> anyhow::Result<Vec<FileTouchedRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, file_path, change_type FROM files_touched
             WHERE checkpoint_id = ?1 ORDER BY file_index",
        )?;
        let files = stmt
            .query_map(params![checkpoint_id], |row| {
                let status: String = row.get(2)?;
                Ok(FileTouchedRow {
                    id: row.get(0)?,
                    path: row.get(1)?,
                    change_type: ChangeType::from_status(&status),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(files)
    }

    fn checkpoint_session_ids(&self, checkpoint_id: &str) -> anyhow::Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id FROM checkpoint_sessions
             WHERE checkpoint_id = ?1 ORDER BY link_order",
        )?;
        let ids = stmt
            .query_map(params![checkpoint_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn exists(&self, sql: &str, key: &str) -> anyhow::Result<bool> {
        let hit: Option<i64> = self
            .conn
            .query_row(sql, params![key], |row| row.get(0))
            .optional()?;
        Ok(hit.is_some())
    }

    fn count(&self, sql: &str) -> anyhow::Result<u64> {
        let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n.max(0) as u64)
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        // Merge WAL back into main DB so users see a single file when idle.
        if let Err(e) = self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);") {
            debug!("wal checkpoint skipped: {e}");
        }
    }
}
