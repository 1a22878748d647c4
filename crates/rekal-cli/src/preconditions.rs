use rekal_core::SilentError;
use rekal_git::{GitCli, GitTransport};
use rekal_store::{Config, RekalPaths};
use rekal_sync::branch_name;
use std::path::Path;

const NOT_INITIALIZED: &str = "rekal not initialized; run 'rekal init' in a git repository";

/// Print `err` once and tag it so `main` does not print it again.
pub fn report(err: anyhow::Error) -> anyhow::Error {
    eprintln!("{err}");
    SilentError::new(err).into()
}

/// The git repository containing `cwd`.
pub fn git_root(cwd: &Path) -> anyhow::Result<GitCli> {
    GitCli::discover(cwd).map_err(report)
}

/// An initialised repository, ready for the commands that need the store.
pub struct Repo {
    pub git: GitCli,
    pub paths: RekalPaths,
    pub config: Config,
}

impl Repo {
    pub fn open(cwd: &Path) -> anyhow::Result<Self> {
        let git = git_root(cwd)?;
        let paths = RekalPaths::discover(git.root());
        if !paths.is_initialized() {
            return Err(report(anyhow::anyhow!(NOT_INITIALIZED)));
        }
        let config = Config::load(&paths.config_json)?;
        Ok(Self { git, paths, config })
    }

    /// Committer identity from `git config user.email`.
    pub fn email(&self) -> String {
        self.git.config_value("user.email").unwrap_or_default()
    }

    pub fn branch(&self) -> String {
        branch_name(&self.config.branch_prefix, &self.email())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rekal_core::is_silent;
    use std::process::Command;

    #[test]
    fn outside_git_is_silent_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Repo::open(tmp.path()).err().unwrap();
        assert!(is_silent(&err));
        assert!(err.to_string().contains("not a git repository"));
    }

    #[test]
    fn uninitialised_repo_is_silent_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let ok = Command::new("git")
            .args(["init", "-q"])
            .current_dir(tmp.path())
            .status()
            .unwrap()
            .success();
        assert!(ok);
        let err = Repo::open(tmp.path()).err().unwrap();
        assert!(is_silent(&err));
        assert_eq!(err.to_string(), NOT_INITIALIZED);
    }
}
