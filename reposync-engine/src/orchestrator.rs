//! Sync orchestrator: the per-workspace state machine.
//!
//! Local writes go straight to the queue store and are always permitted.
//! Network cycles (`pull`, `push`, `sync`) are serialized by a gate; a cycle
//! started while another is in flight returns [`SyncOutcome::AlreadySyncing`]
//! without touching any state.

use crate::error::{SyncError, SyncResult};
use crate::events::{SyncEvent, EVENT_CHANNEL_CAPACITY};
use crate::resolver::ConflictResolver;
use chrono::Utc;
use reposync_remote::{FileChange, RemoteError, RemoteRepository, RepoRef};
use reposync_store::{CommittedFile, QueueStore};
use reposync_types::{
    ConflictRecord, ConflictResolution, EditAction, EntryKind, FileDiff, FileSnapshot,
    PendingEdit, SyncStatus, TreeEntry, Workspace, WorkspaceId,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Result of a `write_file` or `delete_file` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// An edit with this action is queued for the path.
    Queued(EditAction),
    /// The queued edit was removed; the path matches the remote again.
    Reverted,
    /// Nothing changed.
    Unchanged,
}

/// A commit landed by a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub commit_sha: String,
    /// Number of files in the commit.
    pub files: usize,
    /// Edits rewritten during the push and kept queued.
    pub rebased: usize,
    /// Reverts made during the push, queued again as unstaged edits.
    pub restored: usize,
}

/// Result of a network cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Another cycle was in flight; nothing was done.
    AlreadySyncing,
    /// The pull found divergent paths. Nothing was pushed.
    Conflicts(Vec<ConflictRecord>),
    /// The pull found no divergence.
    UpToDate,
    /// No edits were staged.
    NothingToPush,
    /// A commit landed.
    Committed(CommitSummary),
}

#[derive(Debug, Default)]
struct SessionState {
    conflicts: Vec<ConflictRecord>,
    last_error: Option<String>,
    tree: Vec<TreeEntry>,
}

/// Drives pull, push and conflict handling for one workspace.
pub struct SyncOrchestrator<R: RemoteRepository> {
    id: WorkspaceId,
    repo: RepoRef,
    workspace: RwLock<Workspace>,
    store: Arc<QueueStore>,
    remote: Arc<R>,
    default_message: String,
    state: RwLock<SessionState>,
    online: AtomicBool,
    closed: AtomicBool,
    gate: Mutex<()>,
    status: watch::Sender<SyncStatus>,
    events: broadcast::Sender<SyncEvent>,
}

impl<R: RemoteRepository> SyncOrchestrator<R> {
    /// Creates an orchestrator for a workspace. The orchestrator starts idle
    /// and online.
    pub fn new(
        workspace: Workspace,
        store: Arc<QueueStore>,
        remote: Arc<R>,
        default_message: impl Into<String>,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus::Idle);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            id: workspace.id.clone(),
            repo: RepoRef::from(&workspace.key),
            workspace: RwLock::new(workspace),
            store,
            remote,
            default_message: default_message.into(),
            state: RwLock::new(SessionState::default()),
            online: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            gate: Mutex::new(()),
            status,
            events,
        }
    }

    /// Returns the workspace id.
    pub fn workspace_id(&self) -> &WorkspaceId {
        &self.id
    }

    /// Returns the current workspace descriptor.
    pub async fn workspace(&self) -> Workspace {
        self.workspace.read().await.clone()
    }

    // ── Observable state ─────────────────────────────────────────

    /// Returns the current status.
    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    /// Subscribes to status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Subscribes to all events of this workspace.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Returns the conflicts found by the last pull that are still unresolved.
    pub async fn conflicts(&self) -> Vec<ConflictRecord> {
        self.state.read().await.conflicts.clone()
    }

    /// Returns the message of the last failed cycle, cleared by a successful one.
    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    /// Returns the file tree listed by the last clean pull, with
    /// workspace-relative paths.
    pub async fn file_tree(&self) -> Vec<TreeEntry> {
        self.state.read().await.tree.clone()
    }

    /// Returns true while the remote is considered reachable.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Records a connectivity change.
    pub async fn set_online(&self, online: bool) {
        let was = self.online.swap(online, Ordering::SeqCst);
        if was == online {
            return;
        }
        if online {
            info!("Workspace {} back online", self.id);
            if self.status() == SyncStatus::Offline {
                let next = if self.state.read().await.conflicts.is_empty() {
                    SyncStatus::Idle
                } else {
                    SyncStatus::Conflict
                };
                self.set_status(next);
            }
        } else {
            info!("Workspace {} offline", self.id);
            self.set_status(SyncStatus::Offline);
        }
    }

    /// Returns true once the workspace has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Waits for any in-flight cycle, then purges the workspace from the
    /// store. Every later operation fails with `WorkspaceNotFound`.
    pub(crate) async fn close(&self) -> SyncResult<()> {
        let _gate = self.gate.lock().await;
        self.closed.store(true, Ordering::SeqCst);
        self.store.purge_workspace(&self.id)?;
        self.state.write().await.conflicts.clear();
        self.set_status(SyncStatus::Idle);
        Ok(())
    }

    // ── Local edits ──────────────────────────────────────────────

    /// Queues new content for a path, merging with any queued edit.
    ///
    /// Writing the cached remote content back removes the queued edit.
    pub fn write_file(&self, path: &str, content: &str) -> SyncResult<WriteOutcome> {
        self.ensure_open()?;
        let path = normalize_path(path)?;
        let snapshot = self.store.get_snapshot(&self.id, &path)?;
        let existing = self.store.get_edit(&self.id, &path)?;

        if let Some(snapshot) = &snapshot {
            if snapshot.content == content {
                if existing.is_some() {
                    self.store.delete_edit(&self.id, &path)?;
                    debug!("Edit to {} reverted", path);
                    self.notify_edits()?;
                    return Ok(WriteOutcome::Reverted);
                }
                return Ok(WriteOutcome::Unchanged);
            }
        }
        if existing.as_ref().and_then(|e| e.content.as_deref()) == Some(content) {
            return Ok(WriteOutcome::Unchanged);
        }

        let action = if snapshot.is_none() {
            EditAction::Create
        } else {
            EditAction::Update
        };
        let base_sha = match &existing {
            Some(edit) => edit.base_sha.clone(),
            None => snapshot.map(|s| s.sha),
        };
        let mut edit = PendingEdit::new(
            self.id.clone(),
            path.as_str(),
            action,
            Some(content.to_string()),
            base_sha,
        );
        edit.staged = existing.is_some_and(|e| e.staged);
        self.store.upsert_edit(&edit)?;
        debug!("Queued {} of {}", action, path);
        self.notify_edits()?;
        Ok(WriteOutcome::Queued(action))
    }

    /// Queues the deletion of a path known to exist remotely.
    ///
    /// Deleting a file that was only ever created locally drops its edit.
    pub fn delete_file(&self, path: &str) -> SyncResult<WriteOutcome> {
        self.ensure_open()?;
        let path = normalize_path(path)?;
        let existing = self.store.get_edit(&self.id, &path)?;
        let Some(snapshot) = self.store.get_snapshot(&self.id, &path)? else {
            return match existing {
                Some(edit) if edit.action == EditAction::Create => {
                    self.store.delete_edit(&self.id, &path)?;
                    self.notify_edits()?;
                    Ok(WriteOutcome::Reverted)
                }
                _ => Err(SyncError::NotFound(path)),
            };
        };

        if existing.as_ref().is_some_and(PendingEdit::is_delete) {
            return Ok(WriteOutcome::Unchanged);
        }
        let base_sha = match &existing {
            Some(edit) => edit.base_sha.clone(),
            None => Some(snapshot.sha),
        };
        let mut edit = PendingEdit::new(self.id.clone(), path.as_str(), EditAction::Delete, None, base_sha);
        edit.staged = existing.is_some_and(|e| e.staged);
        self.store.upsert_edit(&edit)?;
        debug!("Queued delete of {}", path);
        self.notify_edits()?;
        Ok(WriteOutcome::Queued(EditAction::Delete))
    }

    /// Reads a file: the queued edit first, then the cache, then the remote.
    /// A remote read is cached.
    pub async fn read_file(&self, path: &str) -> SyncResult<String> {
        self.ensure_open()?;
        let path = normalize_path(path)?;
        if let Some(edit) = self.store.get_edit(&self.id, &path)? {
            return edit.content.ok_or(SyncError::NotFound(path));
        }
        if let Some(snapshot) = self.store.get_snapshot(&self.id, &path)? {
            return Ok(snapshot.content);
        }
        if !self.is_online() {
            return Err(SyncError::Offline);
        }

        let (remote_path, branch) = {
            let ws = self.workspace.read().await;
            (ws.remote_path(&path), ws.branch().to_string())
        };
        let file = match self.remote.read_file(&self.repo, &remote_path, &branch).await {
            Ok(file) => file,
            Err(RemoteError::NotFound(_)) => return Err(SyncError::NotFound(path)),
            Err(e) => return Err(e.into()),
        };
        self.store
            .save_snapshot(&FileSnapshot::new(self.id.clone(), path.as_str(), file.content.as_str(), file.sha))?;
        Ok(file.content)
    }

    /// Marks edits for inclusion in the next push. Fails without changing
    /// anything if a path has no queued edit.
    pub fn stage(&self, paths: &[&str]) -> SyncResult<usize> {
        self.set_staged(paths, true)
    }

    /// Excludes edits from the next push.
    pub fn unstage(&self, paths: &[&str]) -> SyncResult<usize> {
        self.set_staged(paths, false)
    }

    /// Stages every queued edit.
    pub fn stage_all(&self) -> SyncResult<usize> {
        self.ensure_open()?;
        let n = self.store.set_all_staged(&self.id, true)?;
        self.notify_edits()?;
        Ok(n)
    }

    /// Unstages every queued edit.
    pub fn unstage_all(&self) -> SyncResult<usize> {
        self.ensure_open()?;
        let n = self.store.set_all_staged(&self.id, false)?;
        self.notify_edits()?;
        Ok(n)
    }

    fn set_staged(&self, paths: &[&str], staged: bool) -> SyncResult<usize> {
        self.ensure_open()?;
        let mut normalized = Vec::with_capacity(paths.len());
        for path in paths {
            let path = normalize_path(path)?;
            if self.store.get_edit(&self.id, &path)?.is_none() {
                return Err(SyncError::NotFound(path));
            }
            normalized.push(path);
        }
        let mut changed = 0;
        for path in &normalized {
            if self.store.set_staged(&self.id, path, staged)? {
                changed += 1;
            }
        }
        self.notify_edits()?;
        Ok(changed)
    }

    /// Returns the queued edits, oldest first.
    pub fn pending_edits(&self) -> SyncResult<Vec<PendingEdit>> {
        Ok(self.store.list_edits(&self.id)?)
    }

    /// Returns the before/after view of one queued edit.
    pub fn diff(&self, path: &str) -> SyncResult<Option<FileDiff>> {
        let path = normalize_path(path)?;
        let Some(edit) = self.store.get_edit(&self.id, &path)? else {
            return Ok(None);
        };
        let snapshot = self.store.get_snapshot(&self.id, &path)?;
        Ok(Some(FileDiff::new(&edit, snapshot.as_ref())))
    }

    /// Returns the before/after view of every queued edit.
    pub fn diffs(&self) -> SyncResult<Vec<FileDiff>> {
        let snapshots: HashMap<String, FileSnapshot> = self
            .store
            .list_snapshots(&self.id)?
            .into_iter()
            .map(|s| (s.path.clone(), s))
            .collect();
        Ok(self
            .store
            .list_edits(&self.id)?
            .iter()
            .map(|edit| FileDiff::new(edit, snapshots.get(&edit.path)))
            .collect())
    }

    // ── Network cycles ───────────────────────────────────────────

    /// Checks every based edit against the branch head.
    ///
    /// Divergent paths become conflicts and move the workspace to
    /// `Conflict`. A clean pull refreshes the file tree and stale cached
    /// files.
    pub async fn pull(&self) -> SyncResult<SyncOutcome> {
        let Ok(_gate) = self.gate.try_lock() else {
            return Ok(SyncOutcome::AlreadySyncing);
        };
        self.ensure_open()?;
        self.ensure_reachable().await?;
        self.pull_locked().await
    }

    /// Commits the staged edits captured at the start of the call.
    pub async fn push(&self, message: Option<&str>) -> SyncResult<SyncOutcome> {
        let Ok(_gate) = self.gate.try_lock() else {
            return Ok(SyncOutcome::AlreadySyncing);
        };
        self.ensure_open()?;
        self.ensure_reachable().await?;
        self.ensure_no_conflicts().await?;
        self.push_locked(message).await
    }

    /// Pulls, then pushes the staged edits if the pull found no conflicts.
    ///
    /// Records the sync time whenever the pull is clean, including when
    /// nothing was staged: the workspace was verified against the branch
    /// head at that time.
    pub async fn sync(&self, message: Option<&str>) -> SyncResult<SyncOutcome> {
        let Ok(_gate) = self.gate.try_lock() else {
            return Ok(SyncOutcome::AlreadySyncing);
        };
        self.ensure_open()?;
        self.ensure_reachable().await?;
        self.ensure_no_conflicts().await?;

        let pulled = self.pull_locked().await?;
        if let SyncOutcome::Conflicts(_) = pulled {
            return Ok(pulled);
        }
        let outcome = self.push_locked(message).await?;

        let now = Utc::now();
        self.store.touch_synced(&self.id, now)?;
        self.workspace.write().await.last_synced_at = Some(now);
        Ok(outcome)
    }

    /// Applies the chosen resolutions. Every path must name an outstanding
    /// conflict; otherwise nothing is applied. Returns the number of
    /// conflicts still outstanding.
    pub async fn resolve_conflicts(&self, resolutions: &[ConflictResolution]) -> SyncResult<usize> {
        let _gate = self.gate.lock().await;
        self.ensure_open()?;
        let mut state = self.state.write().await;

        let mut chosen = Vec::with_capacity(resolutions.len());
        for resolution in resolutions {
            let path = normalize_path(&resolution.path)?;
            let Some(conflict) = state.conflicts.iter().find(|c| c.path == path) else {
                return Err(SyncError::UnknownConflict(path));
            };
            chosen.push((conflict.clone(), &resolution.resolution));
        }

        let resolver = ConflictResolver::new(&self.store, &self.id);
        let mut resolved = HashSet::new();
        for (conflict, resolution) in &chosen {
            resolver.apply(conflict, resolution)?;
            resolved.insert(conflict.path.clone());
        }

        state.conflicts.retain(|c| !resolved.contains(&c.path));
        let remaining = state.conflicts.len();
        info!(
            "Resolved {} conflict(s) in {}, {} remaining",
            resolved.len(),
            self.id,
            remaining
        );
        if remaining == 0 && self.status() == SyncStatus::Conflict {
            self.set_status(SyncStatus::Idle);
        }
        drop(state);
        self.notify_edits()?;
        Ok(remaining)
    }

    async fn pull_locked(&self) -> SyncResult<SyncOutcome> {
        self.set_status(SyncStatus::Syncing);
        match self.try_pull().await {
            Ok(conflicts) if conflicts.is_empty() => {
                self.state.write().await.last_error = None;
                self.settle(SyncStatus::Idle);
                Ok(SyncOutcome::UpToDate)
            }
            Ok(conflicts) => {
                warn!("Pull of {} found {} conflict(s)", self.id, conflicts.len());
                {
                    let mut state = self.state.write().await;
                    state.conflicts = conflicts.clone();
                    state.last_error = None;
                }
                let _ = self.events.send(SyncEvent::ConflictsDetected {
                    workspace_id: self.id.clone(),
                    conflicts: conflicts.clone(),
                });
                self.settle(SyncStatus::Conflict);
                Ok(SyncOutcome::Conflicts(conflicts))
            }
            Err(e) => {
                self.fail(e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn try_pull(&self) -> SyncResult<Vec<ConflictRecord>> {
        let ws = self.workspace().await;
        let head = self.remote.branch_head(&self.repo, ws.branch()).await?;
        debug!("Pulling {} at {}", self.id, head);

        let edits = self.store.list_edits(&self.id)?;
        let mut conflicts = Vec::new();
        for edit in &edits {
            let Some(base_sha) = &edit.base_sha else {
                continue;
            };
            let remote_path = ws.remote_path(&edit.path);
            let (remote_content, remote_sha) =
                match self.remote.read_file(&self.repo, &remote_path, &head).await {
                    Ok(file) if &file.sha == base_sha => continue,
                    Ok(file) => (Some(file.content), Some(file.sha)),
                    Err(RemoteError::NotFound(_)) => (None, None),
                    Err(e) => return Err(e.into()),
                };
            conflicts.push(ConflictRecord {
                path: edit.path.clone(),
                local_content: edit.content.clone(),
                remote_content,
                remote_sha,
                local_sha: base_sha.clone(),
            });
        }

        self.state.write().await.conflicts.clear();
        if !conflicts.is_empty() {
            return Ok(conflicts);
        }

        let listing = self.remote.list_tree(&self.repo, &head, &ws.key.path).await?;
        let tree: Vec<TreeEntry> = listing
            .into_iter()
            .filter_map(|entry| {
                let relative = ws.relative_path(&entry.path)?.to_string();
                Some(TreeEntry {
                    path: relative,
                    ..entry
                })
            })
            .collect();
        self.refresh_cache(&ws, &head, &edits, &tree).await?;
        self.state.write().await.tree = tree;
        Ok(conflicts)
    }

    /// Re-reads cached files the remote changed and drops cached files it
    /// removed. Paths with queued edits keep their snapshot.
    async fn refresh_cache(
        &self,
        ws: &Workspace,
        head: &str,
        edits: &[PendingEdit],
        tree: &[TreeEntry],
    ) -> SyncResult<()> {
        let edited: HashSet<&str> = edits.iter().map(|e| e.path.as_str()).collect();
        let blobs: HashMap<&str, &str> = tree
            .iter()
            .filter(|e| e.kind == EntryKind::Blob)
            .map(|e| (e.path.as_str(), e.sha.as_str()))
            .collect();

        for snapshot in self.store.list_snapshots(&self.id)? {
            if edited.contains(snapshot.path.as_str()) {
                continue;
            }
            match blobs.get(snapshot.path.as_str()) {
                Some(sha) if *sha == snapshot.sha => {}
                Some(_) => {
                    let remote_path = ws.remote_path(&snapshot.path);
                    let file = self.remote.read_file(&self.repo, &remote_path, head).await?;
                    debug!("Refreshed cached {}", snapshot.path);
                    self.store.save_snapshot(&FileSnapshot::new(
                        self.id.clone(),
                        snapshot.path.as_str(),
                        file.content,
                        file.sha,
                    ))?;
                }
                None => {
                    debug!("Dropped cached {}: removed remotely", snapshot.path);
                    self.store.delete_snapshot(&self.id, &snapshot.path)?;
                }
            }
        }
        Ok(())
    }

    async fn push_locked(&self, message: Option<&str>) -> SyncResult<SyncOutcome> {
        let captured: Vec<PendingEdit> = self
            .store
            .list_edits(&self.id)?
            .into_iter()
            .filter(|e| e.staged)
            .collect();
        if captured.is_empty() {
            debug!("Nothing staged in {}", self.id);
            return Ok(SyncOutcome::NothingToPush);
        }

        self.set_status(SyncStatus::Syncing);
        let message = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(self.default_message.as_str());
        match self.try_push(&captured, message).await {
            Ok(summary) => {
                self.state.write().await.last_error = None;
                let _ = self.events.send(SyncEvent::Committed {
                    workspace_id: self.id.clone(),
                    commit_sha: summary.commit_sha.clone(),
                    files: summary.files,
                });
                self.notify_edits()?;
                self.settle(SyncStatus::Idle);
                Ok(SyncOutcome::Committed(summary))
            }
            Err(SyncError::Remote(RemoteError::RefMoved { branch, expected, actual })) => {
                self.fail(format!(
                    "branch {branch} moved since the last pull; pull before pushing again"
                ))
                .await;
                Err(SyncError::Remote(RemoteError::RefMoved {
                    branch,
                    expected,
                    actual,
                }))
            }
            Err(e) => {
                self.fail(e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn try_push(&self, captured: &[PendingEdit], message: &str) -> SyncResult<CommitSummary> {
        let ws = self.workspace().await;
        let parent = self.remote.branch_head(&self.repo, ws.branch()).await?;

        let changes: Vec<FileChange> = captured
            .iter()
            .map(|edit| {
                let path = ws.remote_path(&edit.path);
                match &edit.content {
                    Some(content) if !edit.is_delete() => {
                        FileChange::write(path, edit.action, content.as_str())
                    }
                    _ => FileChange::delete(path),
                }
            })
            .collect();

        let result = self
            .remote
            .commit_files(&self.repo, ws.branch(), &parent, &changes, message)
            .await?;

        let committed: Vec<CommittedFile> = captured
            .iter()
            .map(|edit| {
                let new_sha = if edit.is_delete() {
                    None
                } else {
                    let sha = result.blob_shas.get(&ws.remote_path(&edit.path)).cloned();
                    if sha.is_none() {
                        warn!("Commit {} reported no blob for {}", result.commit_sha, edit.path);
                    }
                    sha
                };
                CommittedFile {
                    edit: edit.clone(),
                    new_sha,
                }
            })
            .collect();
        let applied = self.store.apply_commit(&self.id, &committed)?;

        info!(
            "Pushed {} file(s) from {} as {}",
            captured.len(),
            self.id,
            result.commit_sha
        );
        Ok(CommitSummary {
            commit_sha: result.commit_sha,
            files: captured.len(),
            rebased: applied.rebased,
            restored: applied.restored,
        })
    }

    // ── Helpers ──────────────────────────────────────────────────

    fn ensure_open(&self) -> SyncResult<()> {
        if self.is_closed() {
            return Err(SyncError::WorkspaceNotFound(self.id.to_string()));
        }
        Ok(())
    }

    async fn ensure_reachable(&self) -> SyncResult<()> {
        if !self.is_online() {
            return Err(SyncError::Offline);
        }
        if let Some(limit) = self.remote.rate_limit().await {
            if limit.is_exhausted(Utc::now()) {
                debug!("Not starting a cycle: rate limited until {}", limit.reset_at);
                return Err(RemoteError::RateLimited {
                    reset_at: limit.reset_at,
                }
                .into());
            }
        }
        Ok(())
    }

    async fn ensure_no_conflicts(&self) -> SyncResult<()> {
        let pending = self.state.read().await.conflicts.len();
        if pending > 0 {
            return Err(SyncError::ConflictsPending(pending));
        }
        Ok(())
    }

    async fn fail(&self, message: String) {
        warn!("Sync of {} failed: {}", self.id, message);
        self.state.write().await.last_error = Some(message);
        self.settle(SyncStatus::Error);
    }

    /// Ends a cycle in `next`, unless connectivity was lost meanwhile.
    fn settle(&self, next: SyncStatus) {
        if self.is_online() {
            self.set_status(next);
        } else {
            self.set_status(SyncStatus::Offline);
        }
    }

    fn set_status(&self, status: SyncStatus) {
        let changed = self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            debug!("Workspace {} is now {}", self.id, status);
            let _ = self.events.send(SyncEvent::StatusChanged {
                workspace_id: self.id.clone(),
                status,
            });
        }
    }

    fn notify_edits(&self) -> SyncResult<()> {
        if self.events.receiver_count() == 0 {
            return Ok(());
        }
        let pending = self.store.list_edits(&self.id)?.len();
        let _ = self.events.send(SyncEvent::EditsChanged {
            workspace_id: self.id.clone(),
            pending,
        });
        Ok(())
    }
}

/// Normalizes a workspace-relative path.
///
/// Leading and trailing slashes are dropped; empty, `.` and `..` segments
/// are rejected.
pub fn normalize_path(path: &str) -> SyncResult<String> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty()
        || trimmed
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(SyncError::InvalidPath(path.to_string()));
    }
    Ok(trimmed.to_string())
}
