//! Workspace lifecycle: open, restore, switch branch, close.

use crate::config::EngineConfig;
use crate::error::{SyncError, SyncResult};
use crate::orchestrator::SyncOrchestrator;
use reposync_remote::{RemoteRepository, RepoRef};
use reposync_store::QueueStore;
use reposync_types::{RecentWorkspace, Workspace, WorkspaceId, WorkspaceKey};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Owns one orchestrator per open workspace.
///
/// Orchestrators of different workspaces share the store and the remote
/// client but no sync state.
pub struct WorkspaceManager<R: RemoteRepository> {
    store: Arc<QueueStore>,
    remote: Arc<R>,
    config: EngineConfig,
    open: RwLock<HashMap<WorkspaceId, Arc<SyncOrchestrator<R>>>>,
}

impl<R: RemoteRepository> WorkspaceManager<R> {
    pub fn new(store: Arc<QueueStore>, remote: Arc<R>, config: EngineConfig) -> Self {
        Self {
            store,
            remote,
            config,
            open: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the shared queue store.
    pub fn store(&self) -> &Arc<QueueStore> {
        &self.store
    }

    /// Opens a repository location for editing.
    ///
    /// Without a branch the repository's default branch is used. Reopening a
    /// location returns the existing workspace with its queued edits.
    pub async fn open_workspace(
        &self,
        owner: &str,
        repo: &str,
        branch: Option<&str>,
        path: &str,
    ) -> SyncResult<Arc<SyncOrchestrator<R>>> {
        let repo_ref = RepoRef::new(owner, repo);
        let (branch, default_branch) = match branch {
            Some(branch) => (branch.to_string(), None),
            None => {
                let default_branch = self.remote.default_branch(&repo_ref).await?;
                (default_branch.clone(), Some(default_branch))
            }
        };
        let key = WorkspaceKey::new(owner, repo, branch, path);
        let id = key.id();

        if let Some(orchestrator) = self.open.read().await.get(&id) {
            self.store.record_recent(&RecentWorkspace::from(&orchestrator.workspace().await))?;
            return Ok(Arc::clone(orchestrator));
        }

        let workspace = match self.store.get_workspace(&id)? {
            Some(existing) => existing,
            None => {
                let default_branch = match default_branch {
                    Some(default_branch) => default_branch,
                    None => self.remote.default_branch(&repo_ref).await?,
                };
                let workspace = Workspace::new(key, default_branch);
                self.store.save_workspace(&workspace)?;
                info!("Opened workspace {} ({})", workspace.id, workspace.display_name);
                workspace
            }
        };
        self.activate(workspace).await
    }

    /// Reopens a workspace saved by an earlier session.
    pub async fn restore_workspace(&self, id: &WorkspaceId) -> SyncResult<Arc<SyncOrchestrator<R>>> {
        if let Some(orchestrator) = self.open.read().await.get(id) {
            self.store.record_recent(&RecentWorkspace::from(&orchestrator.workspace().await))?;
            return Ok(Arc::clone(orchestrator));
        }
        let workspace = self
            .store
            .get_workspace(id)?
            .ok_or_else(|| SyncError::WorkspaceNotFound(id.to_string()))?;
        info!("Restored workspace {} ({})", workspace.id, workspace.display_name);
        self.activate(workspace).await
    }

    /// Opens the same repository location on another branch. The current
    /// workspace stays open with its queued edits.
    pub async fn switch_branch(
        &self,
        id: &WorkspaceId,
        branch: &str,
    ) -> SyncResult<Arc<SyncOrchestrator<R>>> {
        let current = self
            .store
            .get_workspace(id)?
            .ok_or_else(|| SyncError::WorkspaceNotFound(id.to_string()))?;
        let key = current.key.with_branch(branch);
        let new_id = key.id();

        if let Some(orchestrator) = self.open.read().await.get(&new_id) {
            return Ok(Arc::clone(orchestrator));
        }
        let workspace = match self.store.get_workspace(&new_id)? {
            Some(existing) => existing,
            None => {
                let workspace = Workspace::new(key, current.default_branch.clone());
                self.store.save_workspace(&workspace)?;
                workspace
            }
        };
        info!("Switched {} to branch {}", current.display_name, branch);
        self.activate(workspace).await
    }

    /// Closes a workspace, purging its queued edits and cached files.
    ///
    /// An in-flight cycle finishes first. Handles still held by callers
    /// reject further use.
    pub async fn close_workspace(&self, id: &WorkspaceId) -> SyncResult<()> {
        if self.store.get_workspace(id)?.is_none() {
            return Err(SyncError::WorkspaceNotFound(id.to_string()));
        }
        let orchestrator = self.open.write().await.remove(id);
        match orchestrator {
            Some(orchestrator) => orchestrator.close().await?,
            None => self.store.purge_workspace(id)?,
        }
        info!("Closed workspace {}", id);
        Ok(())
    }

    /// Returns the orchestrator of an open workspace.
    pub async fn get(&self, id: &WorkspaceId) -> Option<Arc<SyncOrchestrator<R>>> {
        self.open.read().await.get(id).cloned()
    }

    /// Returns the recently opened workspaces, most recent first.
    pub fn recent_workspaces(&self) -> SyncResult<Vec<RecentWorkspace>> {
        Ok(self.store.list_recent()?)
    }

    /// Returns every workspace that has not been closed, oldest first.
    pub fn open_workspaces(&self) -> SyncResult<Vec<Workspace>> {
        Ok(self.store.list_workspaces()?)
    }

    async fn activate(&self, workspace: Workspace) -> SyncResult<Arc<SyncOrchestrator<R>>> {
        self.store.record_recent(&RecentWorkspace::from(&workspace))?;
        let id = workspace.id.clone();
        let orchestrator = Arc::new(SyncOrchestrator::new(
            workspace,
            Arc::clone(&self.store),
            Arc::clone(&self.remote),
            self.config.default_commit_message.clone(),
        ));
        let mut open = self.open.write().await;
        let entry = open.entry(id).or_insert(orchestrator);
        Ok(Arc::clone(entry))
    }
}
