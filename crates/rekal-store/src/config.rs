use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::write_atomic;

/// Overrides `session_dir` when set.
pub const SESSION_DIR_ENV: &str = "REKAL_SESSION_DIR";

/// Settings from `.rekal/config.json`. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remote: String,
    pub branch_prefix: String,
    pub compression_level: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_dir: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            branch_prefix: "rekal/".to_string(),
            compression_level: 3,
            session_dir: None,
        }
    }
}

pub const CONFIG_KEYS: [&str; 4] = ["remote", "branch_prefix", "compression_level", "session_dir"];

impl Config {
    /// Read the config file, or defaults if it does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("invalid {}: {e}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())
    }

    /// Transcript directory override: the environment wins over the file.
    pub fn session_dir_override(&self) -> Option<PathBuf> {
        std::env::var_os(SESSION_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| self.session_dir.as_ref().map(PathBuf::from))
    }

    pub fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(match key {
            "remote" => Some(self.remote.clone()),
            "branch_prefix" => Some(self.branch_prefix.clone()),
            "compression_level" => Some(self.compression_level.to_string()),
            "session_dir" => self.session_dir.clone(),
            other => anyhow::bail!("unknown config key: {other}"),
        })
    }

    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "remote" => {
                if value.trim().is_empty() {
                    anyhow::bail!("remote must not be empty");
                }
                self.remote = value.to_string();
            }
            "branch_prefix" => self.branch_prefix = value.to_string(),
            "compression_level" => {
                let level: i32 = value
                    .parse()
                    .map_err(|_| anyhow::anyhow!("compression_level must be an integer"))?;
                if !(1..=22).contains(&level) {
                    anyhow::bail!("compression_level must be between 1 and 22");
                }
                self.compression_level = level;
            }
            "session_dir" => {
                self.session_dir = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                }
            }
            other => anyhow::bail!("unknown config key: {other}"),
        }
        Ok(())
    }

    /// `(key, value)` for every key, unset ones included.
    pub fn entries(&self) -> Vec<(&'static str, Option<String>)> {
        CONFIG_KEYS
            .iter()
            .map(|k| (*k, self.get(k).ok().flatten()))
            .collect()
    }
}
