//! Engine configuration.

use crate::error::{SyncError, SyncResult};
use reposync_remote::GitHubConfig;
use reposync_store::DEFAULT_RECENT_LIMIT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the sync engine.
///
/// Every field has a default, so a partial TOML file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// SQLite database holding queued edits and cached files.
    pub database_path: PathBuf,
    /// Bound of the recently opened workspace list.
    pub recent_limit: usize,
    /// Commit message used when a push is given none.
    pub default_commit_message: String,
    /// GitHub API settings.
    pub github: GitHubConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("reposync.db"),
            recent_limit: DEFAULT_RECENT_LIMIT,
            default_commit_message: "Update files via reposync".to_string(),
            github: GitHubConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(s: &str) -> SyncResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file.
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> SyncResult<()> {
        if self.recent_limit == 0 {
            return Err(SyncError::Config("recent_limit must be at least 1".to_string()));
        }
        if self.default_commit_message.trim().is_empty() {
            return Err(SyncError::Config(
                "default_commit_message must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
