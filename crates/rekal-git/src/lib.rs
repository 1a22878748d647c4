//! Version-control transport used by the sync pipelines.
//!
//! Everything the core needs from git sits behind [`GitTransport`]:
//! reading wire files at a ref, building blob/tree/commit objects, moving a
//! branch ref, and talking to a remote. [`GitCli`] shells out to `git`;
//! [`MemoryGit`] is a content-addressed in-memory stand-in for tests.

pub mod cli;
pub mod memory;

pub use cli::GitCli;
pub use memory::{MemoryGit, MemoryRemote, SharedRemote};

use std::path::Path;

/// Object id git uses for "no such ref" in compare-and-swap updates.
pub const ZERO_OID: &str = "0000000000000000000000000000000000000000";

/// One regular-file entry of a flat tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub blob: String,
}

/// One line of `--name-status` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Raw status column, e.g. `M` or `R100`.
    pub status: String,
    pub path: String,
}

/// A push attempt that the remote or the network refused. `output` holds the
/// combined transport output for classification.
#[derive(Debug, thiserror::Error)]
#[error("git push failed: {output}")]
pub struct PushFailure {
    pub output: String,
}

pub trait GitTransport {
    /// Top-level directory of the working repository.
    fn root(&self) -> &Path;

    /// Commit id a ref or revision points to, or `None` if it does not exist.
    fn resolve_ref(&self, rev: &str) -> anyhow::Result<Option<String>>;

    /// Contents of `path` in the tree of `rev`; `None` if either is missing.
    fn read_file(&self, rev: &str, path: &str) -> anyhow::Result<Option<Vec<u8>>>;

    fn write_blob(&mut self, data: &[u8]) -> anyhow::Result<String>;

    /// Build a flat tree of regular files.
    fn write_tree(&mut self, entries: &[TreeEntry]) -> anyhow::Result<String>;

    fn commit_tree(
        &mut self,
        tree: &str,
        parent: Option<&str>,
        message: &str,
    ) -> anyhow::Result<String>;

    /// Move `refname` to `new`, but only if it currently points at
    /// `expected_old` (`None`: the ref must not exist yet).
    fn update_ref(
        &mut self,
        refname: &str,
        new: &str,
        expected_old: Option<&str>,
    ) -> anyhow::Result<()>;

    fn has_remote(&self, remote: &str) -> anyhow::Result<bool>;

    /// Push `refs/heads/<branch>` to the same name on `remote`.
    fn push(&mut self, remote: &str, branch: &str, force: bool) -> Result<(), PushFailure>;

    /// Fetch with an explicit refspec such as
    /// `+refs/heads/rekal/*:refs/remotes/origin/rekal/*`.
    fn fetch(&mut self, remote: &str, refspec: &str) -> anyhow::Result<()>;

    /// Full names of refs under `prefix`, sorted.
    fn list_refs(&self, prefix: &str) -> anyhow::Result<Vec<String>>;

    fn head_sha(&self) -> Option<String>;

    /// Short name of the checked-out branch.
    fn current_branch(&self) -> Option<String>;

    /// Files changed by the HEAD commit relative to its first parent.
    fn changed_files(&self) -> Vec<FileChange>;

    fn config_value(&self, key: &str) -> Option<String>;
}

/// Parse `--name-status` lines. For renames and copies the new path is kept.
pub fn parse_name_status(output: &str) -> Vec<FileChange> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split('\t');
            let status = parts.next()?.trim();
            let path = parts.last()?;
            if status.is_empty() || path.is_empty() {
                return None;
            }
            Some(FileChange {
                status: status.to_string(),
                path: path.to_string(),
            })
        })
        .collect()
}
