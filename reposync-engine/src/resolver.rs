//! Conflict resolution.
//!
//! Applies one disposition to one conflicting path and writes the outcome
//! back into the queue. The remote side of a conflict was read by the pull
//! that produced it, so every disposition also refreshes the path's snapshot
//! to that remote version.

use crate::error::SyncResult;
use reposync_store::QueueStore;
use reposync_types::{
    ConflictRecord, EditAction, FileSnapshot, PendingEdit, Resolution, WorkspaceId,
};
use tracing::debug;

/// What a resolution left in the queue for its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// No edit remains; the path matches the remote.
    Dropped,
    /// An edit remains, based on the current remote version.
    Rebased,
}

/// Applies resolutions for one workspace.
pub struct ConflictResolver<'a> {
    store: &'a QueueStore,
    workspace_id: &'a WorkspaceId,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(store: &'a QueueStore, workspace_id: &'a WorkspaceId) -> Self {
        Self {
            store,
            workspace_id,
        }
    }

    /// Settles one conflict.
    pub fn apply(&self, conflict: &ConflictRecord, resolution: &Resolution) -> SyncResult<Disposition> {
        let path = conflict.path.as_str();
        self.refresh_snapshot(conflict)?;

        let disposition = match resolution {
            Resolution::UseRemote => {
                self.store.delete_edit(self.workspace_id, path)?;
                Disposition::Dropped
            }
            Resolution::KeepLocal => match self.store.get_edit(self.workspace_id, path)? {
                Some(edit) => {
                    let content = edit.content.clone();
                    self.requeue(conflict, edit, content)?
                }
                None => Disposition::Dropped,
            },
            Resolution::Manual(merged) => match self.store.get_edit(self.workspace_id, path)? {
                Some(edit) => self.requeue(conflict, edit, Some(merged.clone()))?,
                None => {
                    let edit = PendingEdit::new(
                        self.workspace_id.clone(),
                        path,
                        EditAction::Update,
                        Some(merged.clone()),
                        None,
                    );
                    self.requeue(conflict, edit, Some(merged.clone()))?
                }
            },
        };

        debug!("Resolved {} with {:?}: {:?}", path, resolution, disposition);
        Ok(disposition)
    }

    fn refresh_snapshot(&self, conflict: &ConflictRecord) -> SyncResult<()> {
        match (&conflict.remote_content, &conflict.remote_sha) {
            (Some(content), Some(sha)) => {
                let snapshot = FileSnapshot::new(
                    self.workspace_id.clone(),
                    conflict.path.as_str(),
                    content.as_str(),
                    sha.as_str(),
                );
                self.store.save_snapshot(&snapshot)?;
            }
            _ => {
                self.store.delete_snapshot(self.workspace_id, &conflict.path)?;
            }
        }
        Ok(())
    }

    /// Rewrites the edit onto the remote version. `content` of `None` keeps
    /// a queued deletion.
    fn requeue(
        &self,
        conflict: &ConflictRecord,
        mut edit: PendingEdit,
        content: Option<String>,
    ) -> SyncResult<Disposition> {
        let converged = match (&content, &conflict.remote_content) {
            // Both sides deleted the file.
            (None, None) => true,
            (Some(local), Some(remote)) => local == remote,
            _ => false,
        };
        if converged {
            self.store.delete_edit(self.workspace_id, &conflict.path)?;
            return Ok(Disposition::Dropped);
        }

        edit.action = match (&content, &conflict.remote_sha) {
            (None, _) => EditAction::Delete,
            (Some(_), Some(_)) => EditAction::Update,
            (Some(_), None) => EditAction::Create,
        };
        edit.content = content;
        edit.base_sha = conflict.remote_sha.clone();
        self.store.upsert_edit(&edit)?;
        Ok(Disposition::Rebased)
    }
}
