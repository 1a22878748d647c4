use rekal_git::GitTransport;
use tracing::{debug, warn};

use crate::wire::branch_ref;

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The remote branch has diverged from local. Never resolved
    /// automatically; the user decides whether to force.
    #[error("push rejected (non-fast-forward) for {remote}/{branch}")]
    Conflict { remote: String, branch: String },
    /// Anything else the transport reported: network, auth, missing remote.
    #[error("push to {remote} failed: {detail}")]
    Transport { remote: String, detail: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The portable branch does not exist yet.
    NoBranch,
    NoRemote,
    /// The remote-tracking ref already points at the local tip.
    UpToDate,
    Pushed,
    ForcePushed,
}

/// True when push output says the remote has commits local lacks.
pub fn is_conflict(output: &str) -> bool {
    output.contains("non-fast-forward")
        || output.contains("[rejected]")
        || output.contains("fetch first")
}

/// Publish the portable branch. One attempt, no retry.
pub fn push(
    git: &mut dyn GitTransport,
    remote: &str,
    branch: &str,
    force: bool,
) -> Result<PushOutcome, PushError> {
    let transport = |e: anyhow::Error| PushError::Transport {
        remote: remote.to_string(),
        detail: e.to_string(),
    };

    let Some(local) = git.resolve_ref(&branch_ref(branch)).map_err(transport)? else {
        return Ok(PushOutcome::NoBranch);
    };
    if !git.has_remote(remote).map_err(transport)? {
        return Ok(PushOutcome::NoRemote);
    }
    let tracking = format!("refs/remotes/{remote}/{branch}");
    if git.resolve_ref(&tracking).map_err(transport)?.as_deref() == Some(local.as_str()) {
        debug!(branch, "remote already up to date");
        return Ok(PushOutcome::UpToDate);
    }

    match git.push(remote, branch, force) {
        Ok(()) if force => Ok(PushOutcome::ForcePushed),
        Ok(()) => Ok(PushOutcome::Pushed),
        Err(failure) if !force && is_conflict(&failure.output) => {
            warn!(branch, "push rejected: remote diverged");
            Err(PushError::Conflict {
                remote: remote.to_string(),
                branch: branch.to_string(),
            })
        }
        Err(failure) => Err(PushError::Transport {
            remote: remote.to_string(),
            detail: failure.output.trim().to_string(),
        }),
    }
}
