//! Pending edits and file snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ids::{EditId, WorkspaceId};
use crate::Error;

/// The kind of mutation a pending edit carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditAction {
    Create,
    Update,
    Delete,
}

impl EditAction {
    /// Returns the lowercase name used for persistence.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for EditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EditAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidAction(other.to_string())),
        }
    }
}

/// One queued local mutation.
///
/// At most one pending edit exists per `(workspace_id, path)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEdit {
    pub id: EditId,
    pub workspace_id: WorkspaceId,
    /// Path relative to the workspace directory.
    pub path: String,
    pub action: EditAction,
    /// Present unless `action` is `Delete`.
    pub content: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Remote blob sha the edit was made against. `None` for new files.
    pub base_sha: Option<String>,
    /// Whether the edit is included in the next push.
    pub staged: bool,
}

impl PendingEdit {
    /// Creates an unstaged edit timestamped now.
    pub fn new(
        workspace_id: WorkspaceId,
        path: impl Into<String>,
        action: EditAction,
        content: Option<String>,
        base_sha: Option<String>,
    ) -> Self {
        Self {
            id: EditId::new(),
            workspace_id,
            path: path.into(),
            action,
            content,
            timestamp: Utc::now(),
            base_sha,
            staged: false,
        }
    }

    /// Returns true for deletions.
    #[must_use]
    pub fn is_delete(&self) -> bool {
        self.action == EditAction::Delete
    }
}

/// Last content and hash known to match the remote for one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub workspace_id: WorkspaceId,
    pub path: String,
    pub content: String,
    pub sha: String,
    pub cached_at: DateTime<Utc>,
}

impl FileSnapshot {
    /// Creates a snapshot cached now.
    pub fn new(
        workspace_id: WorkspaceId,
        path: impl Into<String>,
        content: impl Into<String>,
        sha: impl Into<String>,
    ) -> Self {
        Self {
            workspace_id,
            path: path.into(),
            content: content.into(),
            sha: sha.into(),
            cached_at: Utc::now(),
        }
    }
}

/// Before/after view of one pending edit, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub path: String,
    pub action: EditAction,
    /// Last known remote content, if the file exists remotely.
    pub original: Option<String>,
    /// Queued content, `None` for deletions.
    pub modified: Option<String>,
    pub staged: bool,
}

impl FileDiff {
    /// Builds the diff of an edit against its snapshot.
    #[must_use]
    pub fn new(edit: &PendingEdit, snapshot: Option<&FileSnapshot>) -> Self {
        Self {
            path: edit.path.clone(),
            action: edit.action,
            original: snapshot.map(|s| s.content.clone()),
            modified: edit.content.clone(),
            staged: edit.staged,
        }
    }
}
