use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tracing::debug;

use crate::{parse_name_status, FileChange, GitTransport, PushFailure, TreeEntry, ZERO_OID};

/// [`GitTransport`] backed by the `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
}

impl GitCli {
    /// Use `root` as the repository top level without checking it.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Locate the repository containing `start`.
    pub fn discover(start: &Path) -> anyhow::Result<Self> {
        let output = Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .current_dir(start)
            .stdin(Stdio::null())
            .output();
        match output {
            Ok(o) if o.status.success() => {
                let top = String::from_utf8_lossy(&o.stdout).trim().to_string();
                if top.is_empty() {
                    anyhow::bail!("not a git repository; run from a git repo");
                }
                Ok(Self::new(top))
            }
            _ => anyhow::bail!("not a git repository; run from a git repo"),
        }
    }

    fn git(&self, args: &[&str]) -> anyhow::Result<Output> {
        debug!(args = %args.join(" "), "git");
        Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| anyhow::anyhow!("git not available: {e}"))
    }

    /// Run and return trimmed stdout, failing with git's stderr.
    fn run(&self, args: &[&str]) -> anyhow::Result<String> {
        let output = self.git(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("git {} failed: {}", args.join(" "), stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run_with_stdin(&self, args: &[&str], input: &[u8]) -> anyhow::Result<String> {
        let mut child = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| anyhow::anyhow!("git not available: {e}"))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input)?;
        }
        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("git {} failed: {}", args.join(" "), stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Stdout when the command succeeds, `None` otherwise.
    fn try_run(&self, args: &[&str]) -> Option<String> {
        self.git(args)
            .ok()
            .filter(|o| o.status.success())
            .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

impl GitTransport for GitCli {
    fn root(&self) -> &Path {
        &self.root
    }

    fn resolve_ref(&self, rev: &str) -> anyhow::Result<Option<String>> {
        let spec = format!("{rev}^{{commit}}");
        let output = self.git(&["rev-parse", "--verify", "--quiet", &spec])?;
        if !output.status.success() {
            return Ok(None);
        }
        let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(Some(sha).filter(|s| !s.is_empty()))
    }

    fn read_file(&self, rev: &str, path: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let spec = format!("{rev}:{path}");
        let output = self.git(&["cat-file", "blob", &spec])?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(output.stdout))
    }

    fn write_blob(&mut self, data: &[u8]) -> anyhow::Result<String> {
        self.run_with_stdin(&["hash-object", "-w", "--stdin"], data)
    }

    fn write_tree(&mut self, entries: &[TreeEntry]) -> anyhow::Result<String> {
        let mut sorted: Vec<&TreeEntry> = entries.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        let mut listing = String::new();
        for e in sorted {
            listing.push_str(&format!("100644 blob {}\t{}\n", e.blob, e.name));
        }
        self.run_with_stdin(&["mktree"], listing.as_bytes())
    }

    fn commit_tree(
        &mut self,
        tree: &str,
        parent: Option<&str>,
        message: &str,
    ) -> anyhow::Result<String> {
        let mut args = vec!["commit-tree", tree];
        if let Some(p) = parent {
            args.extend(["-p", p]);
        }
        args.extend(["-m", message]);
        self.run(&args)
    }

    fn update_ref(
        &mut self,
        refname: &str,
        new: &str,
        expected_old: Option<&str>,
    ) -> anyhow::Result<()> {
        let old = expected_old.unwrap_or(ZERO_OID);
        self.run(&["update-ref", refname, new, old])?;
        Ok(())
    }

    fn has_remote(&self, remote: &str) -> anyhow::Result<bool> {
        let out = self.run(&["remote"])?;
        Ok(out.lines().any(|l| l.trim() == remote))
    }

    fn push(&mut self, remote: &str, branch: &str, force: bool) -> Result<(), PushFailure> {
        // --no-verify: this runs from inside a pre-push hook.
        let mut args = vec!["push", "--no-verify"];
        if force {
            args.push("--force");
        }
        args.extend([remote, branch]);
        let output = self.git(&args).map_err(|e| PushFailure {
            output: e.to_string(),
        })?;
        if output.status.success() {
            return Ok(());
        }
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(PushFailure { output: text })
    }

    fn fetch(&mut self, remote: &str, refspec: &str) -> anyhow::Result<()> {
        self.run(&["fetch", "--no-tags", "--quiet", remote, refspec])?;
        Ok(())
    }

    fn list_refs(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let out = self.run(&["for-each-ref", "--format=%(refname)", prefix])?;
        let mut refs: Vec<String> = out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
        refs.sort();
        Ok(refs)
    }

    fn head_sha(&self) -> Option<String> {
        self.try_run(&["rev-parse", "HEAD"])
    }

    fn current_branch(&self) -> Option<String> {
        self.try_run(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    fn changed_files(&self) -> Vec<FileChange> {
        // --root also lists the files of a parentless first commit.
        match self.try_run(&[
            "diff-tree",
            "--no-commit-id",
            "--name-status",
            "-r",
            "--root",
            "HEAD",
        ]) {
            Some(out) => parse_name_status(&out),
            None => Vec::new(),
        }
    }

    fn config_value(&self, key: &str) -> Option<String> {
        self.try_run(&["config", "--get", key])
    }
}
