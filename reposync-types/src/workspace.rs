//! Workspace descriptors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::WorkspaceId;

/// The repository location a workspace is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkspaceKey {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Directory inside the repository, without leading or trailing slashes.
    /// Empty for the repository root.
    pub path: String,
}

impl WorkspaceKey {
    /// Creates a key, normalizing the workspace path.
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        branch: impl Into<String>,
        path: impl AsRef<str>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch: branch.into(),
            path: path.as_ref().trim_matches('/').to_string(),
        }
    }

    /// Derives the workspace id for this location.
    #[must_use]
    pub fn id(&self) -> WorkspaceId {
        WorkspaceId::derive(&self.owner, &self.repo, &self.branch, &self.path)
    }

    /// Returns the same location on another branch.
    #[must_use]
    pub fn with_branch(&self, branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            ..self.clone()
        }
    }
}

/// One open editing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub key: WorkspaceKey,
    /// The repository's default branch at the time the workspace was opened.
    pub default_branch: String,
    pub display_name: String,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub opened_at: DateTime<Utc>,
}

impl Workspace {
    /// Creates a workspace descriptor opened now.
    pub fn new(key: WorkspaceKey, default_branch: impl Into<String>) -> Self {
        let display_name = if key.path.is_empty() {
            format!("{}/{}", key.owner, key.repo)
        } else {
            format!("{}/{}/{}", key.owner, key.repo, key.path)
        };
        Self {
            id: key.id(),
            key,
            default_branch: default_branch.into(),
            display_name,
            last_synced_at: None,
            opened_at: Utc::now(),
        }
    }

    /// The branch this workspace edits.
    #[must_use]
    pub fn branch(&self) -> &str {
        &self.key.branch
    }

    /// Maps a workspace-relative path to a repository path.
    #[must_use]
    pub fn remote_path(&self, relative: &str) -> String {
        let relative = relative.trim_start_matches('/');
        if self.key.path.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{}", self.key.path, relative)
        }
    }

    /// Maps a repository path back to a workspace-relative path.
    ///
    /// Returns `None` for paths outside the workspace directory.
    #[must_use]
    pub fn relative_path<'a>(&self, remote: &'a str) -> Option<&'a str> {
        if self.key.path.is_empty() {
            return Some(remote);
        }
        remote
            .strip_prefix(self.key.path.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
    }
}

/// An entry in the bounded list of recently opened workspaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentWorkspace {
    pub workspace_id: WorkspaceId,
    pub key: WorkspaceKey,
    pub display_name: String,
    pub last_opened_at: DateTime<Utc>,
}

impl From<&Workspace> for RecentWorkspace {
    fn from(ws: &Workspace) -> Self {
        Self {
            workspace_id: ws.id.clone(),
            key: ws.key.clone(),
            display_name: ws.display_name.clone(),
            last_opened_at: Utc::now(),
        }
    }
}
