use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use rekal_core::sha256_hex;

use crate::{FileChange, GitTransport, PushFailure, TreeEntry};

#[derive(Debug, Clone)]
enum Object {
    Blob(Vec<u8>),
    Tree(Vec<TreeEntry>),
    Commit {
        tree: String,
        parent: Option<String>,
    },
}

fn object_id(kind: &str, body: &[u8]) -> String {
    let mut buf = Vec::with_capacity(kind.len() + 1 + body.len());
    buf.extend_from_slice(kind.as_bytes());
    buf.push(0);
    buf.extend_from_slice(body);
    sha256_hex(&buf)[..40].to_string()
}

/// A bare remote shared between several [`MemoryGit`] clones.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    refs: BTreeMap<String, String>,
    objects: HashMap<String, Object>,
}

impl MemoryRemote {
    pub fn shared() -> SharedRemote {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn ref_target(&self, refname: &str) -> Option<String> {
        self.refs.get(refname).cloned()
    }
}

pub type SharedRemote = Rc<RefCell<MemoryRemote>>;

/// Content-addressed in-memory repository implementing [`GitTransport`].
///
/// HEAD metadata (sha, branch, changed files, config) is set directly by the
/// test instead of being derived from a working tree.
pub struct MemoryGit {
    root: PathBuf,
    objects: HashMap<String, Object>,
    refs: BTreeMap<String, String>,
    remotes: HashMap<String, SharedRemote>,
    head: Option<String>,
    branch: Option<String>,
    changes: Vec<FileChange>,
    config: HashMap<String, String>,
    unreachable: bool,
    push_attempts: usize,
}

impl MemoryGit {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            objects: HashMap::new(),
            refs: BTreeMap::new(),
            remotes: HashMap::new(),
            head: None,
            branch: None,
            changes: Vec::new(),
            config: HashMap::new(),
            unreachable: false,
            push_attempts: 0,
        }
    }

    pub fn add_remote(&mut self, name: &str, remote: SharedRemote) {
        self.remotes.insert(name.to_string(), remote);
    }

    pub fn set_head(&mut self, sha: &str, branch: &str) {
        self.head = Some(sha.to_string());
        self.branch = Some(branch.to_string());
    }

    pub fn set_changes(&mut self, changes: &[(&str, &str)]) {
        self.changes = changes
            .iter()
            .map(|(status, path)| FileChange {
                status: status.to_string(),
                path: path.to_string(),
            })
            .collect();
    }

    pub fn set_config(&mut self, key: &str, value: &str) {
        self.config.insert(key.to_string(), value.to_string());
    }

    /// Make every push fail as if the network were down.
    pub fn set_unreachable(&mut self, unreachable: bool) {
        self.unreachable = unreachable;
    }

    /// Number of times `push` was called.
    pub fn push_attempts(&self) -> usize {
        self.push_attempts
    }

    fn remote(&self, name: &str) -> anyhow::Result<SharedRemote> {
        self.remotes
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("'{name}' does not appear to be a git repository"))
    }

    fn is_ancestor(objects: &HashMap<String, Object>, ancestor: &str, tip: &str) -> bool {
        let mut cur = Some(tip.to_string());
        while let Some(sha) = cur {
            if sha == ancestor {
                return true;
            }
            cur = match objects.get(&sha) {
                Some(Object::Commit { parent, .. }) => parent.clone(),
                _ => None,
            };
        }
        false
    }

    /// Every object reachable from `tip`.
    fn reachable(objects: &HashMap<String, Object>, tip: &str) -> Vec<(String, Object)> {
        let mut out = Vec::new();
        let mut stack = vec![tip.to_string()];
        while let Some(id) = stack.pop() {
            let Some(obj) = objects.get(&id) else {
                continue;
            };
            match obj {
                Object::Commit { tree, parent } => {
                    stack.push(tree.clone());
                    if let Some(p) = parent {
                        stack.push(p.clone());
                    }
                }
                Object::Tree(entries) => {
                    stack.extend(entries.iter().map(|e| e.blob.clone()));
                }
                Object::Blob(_) => {}
            }
            out.push((id, obj.clone()));
        }
        out
    }

    fn resolve(&self, rev: &str) -> Option<String> {
        if let Some(sha) = self.refs.get(rev) {
            return Some(sha.clone());
        }
        for prefix in ["refs/heads/", "refs/remotes/"] {
            if let Some(sha) = self.refs.get(&format!("{prefix}{rev}")) {
                return Some(sha.clone());
            }
        }
        matches!(self.objects.get(rev), Some(Object::Commit { .. })).then(|| rev.to_string())
    }
}

impl GitTransport for MemoryGit {
    fn root(&self) -> &Path {
        &self.root
    }

    fn resolve_ref(&self, rev: &str) -> anyhow::Result<Option<String>> {
        Ok(self.resolve(rev))
    }

    fn read_file(&self, rev: &str, path: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let Some(commit) = self.resolve(rev) else {
            return Ok(None);
        };
        let Some(Object::Commit { tree, .. }) = self.objects.get(&commit) else {
            return Ok(None);
        };
        let Some(Object::Tree(entries)) = self.objects.get(tree) else {
            anyhow::bail!("corrupt commit {commit}: missing tree");
        };
        let Some(entry) = entries.iter().find(|e| e.name == path) else {
            return Ok(None);
        };
        match self.objects.get(&entry.blob) {
            Some(Object::Blob(data)) => Ok(Some(data.clone())),
            _ => anyhow::bail!("corrupt tree {tree}: missing blob {}", entry.blob),
        }
    }

    fn write_blob(&mut self, data: &[u8]) -> anyhow::Result<String> {
        let id = object_id("blob", data);
        self.objects.insert(id.clone(), Object::Blob(data.to_vec()));
        Ok(id)
    }

    fn write_tree(&mut self, entries: &[TreeEntry]) -> anyhow::Result<String> {
        let mut sorted = entries.to_vec();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        let mut listing = String::new();
        for e in &sorted {
            if !matches!(self.objects.get(&e.blob), Some(Object::Blob(_))) {
                anyhow::bail!("mktree: unknown blob {}", e.blob);
            }
            listing.push_str(&format!("100644 blob {}\t{}\n", e.blob, e.name));
        }
        let id = object_id("tree", listing.as_bytes());
        self.objects.insert(id.clone(), Object::Tree(sorted));
        Ok(id)
    }

    fn commit_tree(
        &mut self,
        tree: &str,
        parent: Option<&str>,
        message: &str,
    ) -> anyhow::Result<String> {
        if !matches!(self.objects.get(tree), Some(Object::Tree(_))) {
            anyhow::bail!("commit-tree: unknown tree {tree}");
        }
        // Commits are unique per call, like real commits carrying a timestamp.
        let seq = self.objects.len();
        let text = format!("tree {tree}\nparent {parent:?}\nseq {seq}\n\n{message}");
        let id = object_id("commit", text.as_bytes());
        self.objects.insert(
            id.clone(),
            Object::Commit {
                tree: tree.to_string(),
                parent: parent.map(String::from),
            },
        );
        Ok(id)
    }

    fn update_ref(
        &mut self,
        refname: &str,
        new: &str,
        expected_old: Option<&str>,
    ) -> anyhow::Result<()> {
        let current = self.refs.get(refname).map(String::as_str);
        if current != expected_old {
            anyhow::bail!(
                "update-ref {refname}: expected {:?}, found {:?}",
                expected_old,
                current
            );
        }
        self.refs.insert(refname.to_string(), new.to_string());
        Ok(())
    }

    fn has_remote(&self, remote: &str) -> anyhow::Result<bool> {
        Ok(self.remotes.contains_key(remote))
    }

    fn push(&mut self, remote: &str, branch: &str, force: bool) -> Result<(), PushFailure> {
        self.push_attempts += 1;
        if self.unreachable {
            return Err(PushFailure {
                output: format!(
                    "fatal: unable to access '{remote}': Could not resolve host: example.invalid"
                ),
            });
        }
        let shared = self.remote(remote).map_err(|e| PushFailure {
            output: format!("fatal: {e}"),
        })?;
        let refname = format!("refs/heads/{branch}");
        let Some(local) = self.refs.get(&refname).cloned() else {
            return Err(PushFailure {
                output: format!("error: src refspec {branch} does not match any"),
            });
        };

        let mut r = shared.borrow_mut();
        if let Some(remote_tip) = r.refs.get(&refname).cloned() {
            if !force && !Self::is_ancestor(&self.objects, &remote_tip, &local) {
                let reason = if self.objects.contains_key(&remote_tip) {
                    "non-fast-forward"
                } else {
                    "fetch first"
                };
                return Err(PushFailure {
                    output: format!(
                        "To {remote}\n ! [rejected]        {branch} -> {branch} ({reason})\n\
                         error: failed to push some refs to '{remote}'\n"
                    ),
                });
            }
        }
        for (id, obj) in Self::reachable(&self.objects, &local) {
            r.objects.entry(id).or_insert(obj);
        }
        r.refs.insert(refname, local.clone());
        drop(r);
        self.refs
            .insert(format!("refs/remotes/{remote}/{branch}"), local);
        Ok(())
    }

    fn fetch(&mut self, remote: &str, refspec: &str) -> anyhow::Result<()> {
        let shared = self.remote(remote)?;
        let spec = refspec.trim_start_matches('+');
        let (src, dst) = spec
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("invalid refspec {refspec}"))?;
        let src_prefix = src.trim_end_matches('*');
        let dst_prefix = dst.trim_end_matches('*');

        let r = shared.borrow();
        for (name, tip) in r.refs.range(src_prefix.to_string()..) {
            let Some(rest) = name.strip_prefix(src_prefix) else {
                break;
            };
            for (id, obj) in Self::reachable(&r.objects, tip) {
                self.objects.entry(id).or_insert(obj);
            }
            self.refs.insert(format!("{dst_prefix}{rest}"), tip.clone());
        }
        Ok(())
    }

    fn list_refs(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .refs
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn head_sha(&self) -> Option<String> {
        self.head.clone()
    }

    fn current_branch(&self) -> Option<String> {
        self.branch.clone()
    }

    fn changed_files(&self) -> Vec<FileChange> {
        self.changes.clone()
    }

    fn config_value(&self, key: &str) -> Option<String> {
        self.config.get(key).cloned()
    }
}
