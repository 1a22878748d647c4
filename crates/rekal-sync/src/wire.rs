//! The per-identity portable branch and the two wire files it carries.

use anyhow::Context;
use rekal_codec::{new_body_with_flags, read_flags, Dict, FLAG_PRESET_DICT};
use rekal_git::{GitTransport, TreeEntry};
use tracing::debug;

pub const BODY_FILE: &str = "rekal.body";
pub const DICT_FILE: &str = "dict.bin";
pub const CHECKPOINT_MESSAGE: &str = "rekal: checkpoint";
pub const INIT_MESSAGE: &str = "rekal: init";

/// `rekal/<email>` with characters git refuses in ref names replaced.
pub fn branch_name(prefix: &str, email: &str) -> String {
    let email = email.trim();
    let ident = if email.is_empty() { "unknown" } else { email };
    let mut safe = String::with_capacity(ident.len());
    for c in ident.chars() {
        match c {
            ' ' | '~' | '^' | ':' | '?' | '*' | '[' | '\\' => safe.push('-'),
            c if c.is_control() => safe.push('-'),
            c => safe.push(c),
        }
    }
    while safe.contains("..") {
        safe = safe.replace("..", ".");
    }
    let safe = safe.replace("@{", "@-");
    let safe = safe.trim_end_matches(".lock").trim_matches('.');
    format!("{prefix}{safe}")
}

pub fn branch_ref(branch: &str) -> String {
    format!("refs/heads/{branch}")
}

/// Dictionary and body log as of one commit of the portable branch.
#[derive(Debug, Clone)]
pub struct WireState {
    /// Commit the state was read from; `None` for a branch that does not
    /// exist yet.
    pub tip: Option<String>,
    pub dict: Dict,
    pub body: Vec<u8>,
}

impl WireState {
    pub fn empty() -> Self {
        Self {
            tip: None,
            dict: Dict::new(),
            body: new_body_with_flags(FLAG_PRESET_DICT),
        }
    }

    /// Read the wire files at the tip of `refs/heads/<branch>`.
    pub fn load(git: &dyn GitTransport, branch: &str) -> anyhow::Result<Self> {
        let refname = branch_ref(branch);
        let Some(tip) = git.resolve_ref(&refname)? else {
            debug!(branch, "portable branch absent, starting empty");
            return Ok(Self::empty());
        };
        let mut state = Self::load_at(git, &refname)?;
        state.tip = Some(tip);
        Ok(state)
    }

    /// Read the wire files at any revision (e.g. a remote-tracking ref).
    pub fn load_at(git: &dyn GitTransport, rev: &str) -> anyhow::Result<Self> {
        let body = match git.read_file(rev, BODY_FILE)? {
            Some(b) if !b.is_empty() => {
                read_flags(&b).with_context(|| format!("{BODY_FILE} at {rev}"))?;
                b
            }
            _ => new_body_with_flags(FLAG_PRESET_DICT),
        };
        let dict = match git.read_file(rev, DICT_FILE)? {
            Some(d) if !d.is_empty() => {
                Dict::decode(&d).with_context(|| format!("{DICT_FILE} at {rev}"))?
            }
            _ => Dict::new(),
        };
        debug!(rev, body_len = body.len(), dict_entries = dict.total_entries(), "loaded wire state");
        Ok(Self {
            tip: None,
            dict,
            body,
        })
    }

    /// Write both files as a new commit on top of `self.tip` and advance the
    /// branch. The ref update is a compare-and-swap against `self.tip`; it is
    /// the only step visible to other readers, so a failure anywhere before it
    /// leaves nothing but unreferenced objects behind.
    pub fn commit(
        &self,
        git: &mut dyn GitTransport,
        branch: &str,
        message: &str,
    ) -> anyhow::Result<String> {
        let dict_bytes = self.dict.encode().context("encode dictionary")?;
        let dict_blob = git.write_blob(&dict_bytes)?;
        let body_blob = git.write_blob(&self.body)?;
        let tree = git.write_tree(&[
            TreeEntry {
                name: DICT_FILE.to_string(),
                blob: dict_blob,
            },
            TreeEntry {
                name: BODY_FILE.to_string(),
                blob: body_blob,
            },
        ])?;
        let commit = git.commit_tree(&tree, self.tip.as_deref(), message)?;
        git.update_ref(&branch_ref(branch), &commit, self.tip.as_deref())
            .with_context(|| format!("advance {branch}"))?;
        Ok(commit)
    }
}

/// Create the portable branch with an empty dictionary and a header-only
/// body. Returns `false` when the branch already exists.
pub fn init_branch(git: &mut dyn GitTransport, branch: &str) -> anyhow::Result<bool> {
    if git.resolve_ref(&branch_ref(branch))?.is_some() {
        return Ok(false);
    }
    WireState::empty().commit(git, branch, INIT_MESSAGE)?;
    Ok(true)
}
