use clap::Subcommand;
use std::path::Path;

use crate::preconditions::Repo;

// ── CLI Schema ──

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Set a config value
    Set {
        /// Config key (remote, branch_prefix, compression_level, session_dir)
        key: String,
        /// Config value; an empty session_dir clears it
        value: String,
    },
    /// Get a config value
    Get {
        /// Config key
        key: String,
    },
    /// List all config values
    List,
}

// ── Dispatch ──

pub fn run(cmd: ConfigCmd, cwd: &Path) -> anyhow::Result<()> {
    let repo = Repo::open(cwd)?;
    let path = repo.paths.config_json.as_path();
    let mut config = repo.config;
    match cmd {
        ConfigCmd::Set { key, value } => {
            config.set(&key, &value)?;
            config.save(path)?;
            println!("{key} = {value}");
        }
        ConfigCmd::Get { key } => match config.get(&key)? {
            Some(v) => println!("{v}"),
            None => anyhow::bail!("config key not set: {key}"),
        },
        ConfigCmd::List => {
            for (key, value) in config.entries() {
                match value {
                    Some(v) => println!("{key} = {v}"),
                    None => println!("{key} ="),
                }
            }
        }
    }
    Ok(())
}
