//! Core type definitions for reposync.
//!
//! This crate defines the data model shared by the store, the remote client
//! and the sync engine:
//! - Workspace and edit identifiers
//! - Workspace descriptors and the recency list entry
//! - Pending edits and last-known-remote file snapshots
//! - Conflict records and their resolutions
//! - The workspace-scoped sync status
//!
//! Nothing here performs I/O.

mod conflict;
mod edit;
mod ids;
mod status;
mod tree;
mod workspace;

pub use conflict::{ConflictRecord, ConflictResolution, Resolution};
pub use edit::{EditAction, FileDiff, FileSnapshot, PendingEdit};
pub use ids::{EditId, WorkspaceId};
pub use status::SyncStatus;
pub use tree::{EntryKind, TreeEntry};
pub use workspace::{RecentWorkspace, Workspace, WorkspaceKey};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid edit action: {0}")]
    InvalidAction(String),

    #[error("invalid sync status: {0}")]
    InvalidStatus(String),

    #[error("invalid workspace id: {0}")]
    InvalidWorkspaceId(String),
}
