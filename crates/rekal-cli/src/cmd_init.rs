use rekal_git::GitTransport;
use rekal_store::{Config, RekalPaths, SqliteStore};
use rekal_sync::{branch_name, init_branch};
use std::path::Path;
use tracing::debug;

use crate::preconditions::git_root;

pub fn execute(cwd: &Path) -> anyhow::Result<()> {
    let mut git = git_root(cwd)?;
    let paths = RekalPaths::discover(git.root());
    let already = paths.is_initialized();

    paths.ensure_layout()?;
    SqliteStore::open_or_create(&paths.data_db)?;

    if !paths.config_json.exists() {
        Config::default().save(&paths.config_json)?;
    }
    let config = Config::load(&paths.config_json)?;

    let email = git.config_value("user.email").unwrap_or_default();
    let branch = branch_name(&config.branch_prefix, &email);
    if init_branch(&mut git, &branch)? {
        debug!(branch, "created portable branch");
    }

    if already {
        println!("Already initialized at {}", paths.rekal_dir.display());
    } else {
        println!("Rekal initialized.");
    }
    Ok(())
}
