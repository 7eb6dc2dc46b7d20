//! Notifications published by an orchestrator.

use reposync_types::{ConflictRecord, SyncStatus, WorkspaceId};

/// Capacity of each orchestrator's event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A change observable by the editor layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The workspace moved to a new status.
    StatusChanged {
        workspace_id: WorkspaceId,
        status: SyncStatus,
    },
    /// The pending edit queue changed.
    EditsChanged {
        workspace_id: WorkspaceId,
        pending: usize,
    },
    /// A pull found divergent paths.
    ConflictsDetected {
        workspace_id: WorkspaceId,
        conflicts: Vec<ConflictRecord>,
    },
    /// A push landed a commit.
    Committed {
        workspace_id: WorkspaceId,
        commit_sha: String,
        files: usize,
    },
}

impl SyncEvent {
    /// The workspace the event belongs to.
    pub fn workspace_id(&self) -> &WorkspaceId {
        match self {
            SyncEvent::StatusChanged { workspace_id, .. }
            | SyncEvent::EditsChanged { workspace_id, .. }
            | SyncEvent::ConflictsDetected { workspace_id, .. }
            | SyncEvent::Committed { workspace_id, .. } => workspace_id,
        }
    }
}
