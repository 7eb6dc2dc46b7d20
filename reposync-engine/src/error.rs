//! Error types for the sync engine.

use reposync_remote::RemoteError;
use reposync_store::StoreError;
use thiserror::Error;

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Local persistence failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The remote rejected or failed a request.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// The path has no cached, queued or remote version.
    #[error("file not found: {0}")]
    NotFound(String),

    /// The path is empty or escapes the workspace.
    #[error("invalid path: {0:?}")]
    InvalidPath(String),

    /// Conflicts from the last pull must be resolved first.
    #[error("{0} unresolved conflict(s); resolve them before pushing")]
    ConflictsPending(usize),

    /// The workspace is offline.
    #[error("workspace is offline")]
    Offline,

    /// A resolution named a path without an outstanding conflict.
    #[error("no outstanding conflict for {0}")]
    UnknownConflict(String),

    /// No workspace descriptor with this id exists.
    #[error("workspace not found: {0}")]
    WorkspaceNotFound(String),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Returns true if retrying later, without other changes, may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(e) => e.is_retryable(),
            SyncError::Offline => true,
            _ => false,
        }
    }
}
