pub mod config;
pub mod lock;
pub mod paths;
pub mod sqlite_store;

pub use config::Config;
pub use lock::WorkspaceLock;
pub use paths::RekalPaths;
pub use sqlite_store::SqliteStore;

use std::io::Write;
use std::path::Path;

/// Write via temp file + rename so readers never see a half-written file.
pub fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("no parent dir for {}", path.display()))?;
    std::fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_replaces_content() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.json");
        write_atomic(&path, b"{}").unwrap();
        write_atomic(&path, b"{\"remote\":\"origin\"}").unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "{\"remote\":\"origin\"}"
        );
        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
