//! Remote repository abstraction trait.
//!
//! Defines the read primitives and the single atomic write primitive the
//! sync engine relies on.

use crate::error::RemoteResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reposync_types::{EditAction, TreeEntry, WorkspaceKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifies a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl From<&WorkspaceKey> for RepoRef {
    fn from(key: &WorkspaceKey) -> Self {
        Self::new(key.owner.clone(), key.repo.clone())
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// A file read from the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Repository path.
    pub path: String,
    pub content: String,
    /// Blob sha of the content.
    pub sha: String,
}

/// One change to apply in a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Repository path.
    pub path: String,
    pub action: EditAction,
    /// Present unless `action` is `Delete`.
    pub content: Option<String>,
}

impl FileChange {
    /// A creation or update carrying new content.
    pub fn write(path: impl Into<String>, action: EditAction, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            action,
            content: Some(content.into()),
        }
    }

    /// A deletion.
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            action: EditAction::Delete,
            content: None,
        }
    }
}

/// Outcome of a landed commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    pub commit_sha: String,
    pub tree_sha: String,
    /// Blob sha of every created or updated path, keyed by repository path.
    pub blob_shas: HashMap<String, String>,
}

/// Request quota as last reported by the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimit {
    /// Returns true while no requests may be sent.
    pub fn is_exhausted(&self, now: DateTime<Utc>) -> bool {
        self.remaining == 0 && now < self.reset_at
    }
}

/// Abstract remote repository interface.
///
/// Implementations must make `commit_files` all-or-nothing: either every
/// change lands in exactly one new commit on `branch`, or the branch is left
/// untouched. The branch is never force-updated.
#[async_trait]
pub trait RemoteRepository: Send + Sync {
    /// Returns the name of the remote provider.
    fn provider_name(&self) -> &'static str;

    /// Reads a file at a ref. Fails with `NotFound` if absent.
    async fn read_file(&self, repo: &RepoRef, path: &str, git_ref: &str)
        -> RemoteResult<RemoteFile>;

    /// Returns the commit sha the branch currently points at.
    async fn branch_head(&self, repo: &RepoRef, branch: &str) -> RemoteResult<String>;

    /// Returns the repository's default branch name.
    async fn default_branch(&self, repo: &RepoRef) -> RemoteResult<String>;

    /// Lists all entries below `prefix` at a ref, recursively.
    async fn list_tree(
        &self,
        repo: &RepoRef,
        git_ref: &str,
        prefix: &str,
    ) -> RemoteResult<Vec<TreeEntry>>;

    /// Replaces the given files in one new commit whose only parent is
    /// `parent_sha`, then advances `branch` to it if it still points at
    /// `parent_sha`. Fails with `RefMoved` otherwise.
    async fn commit_files(
        &self,
        repo: &RepoRef,
        branch: &str,
        parent_sha: &str,
        changes: &[FileChange],
        message: &str,
    ) -> RemoteResult<CommitResult>;

    /// Returns the last known request quota, if the remote reports one.
    async fn rate_limit(&self) -> Option<RateLimit>;
}

/// Rejects change sets that touch one path more than once.
pub(crate) fn check_unique_paths(changes: &[FileChange]) -> RemoteResult<()> {
    let mut seen = std::collections::HashSet::new();
    for change in changes {
        if !seen.insert(change.path.as_str()) {
            return Err(crate::error::RemoteError::InvalidRequest(format!(
                "path {} appears more than once in one commit",
                change.path
            )));
        }
        if change.action != EditAction::Delete && change.content.is_none() {
            return Err(crate::error::RemoteError::InvalidRequest(format!(
                "{} of {} carries no content",
                change.action, change.path
            )));
        }
    }
    if changes.is_empty() {
        return Err(crate::error::RemoteError::InvalidRequest(
            "commit has no changes".to_string(),
        ));
    }
    Ok(())
}
