//! SQLite-backed queue store.

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use reposync_types::{
    EditAction, EditId, FileSnapshot, PendingEdit, RecentWorkspace, Workspace, WorkspaceId,
    WorkspaceKey,
};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Default bound of the recency list.
pub const DEFAULT_RECENT_LIMIT: usize = 10;

const EDIT_COLUMNS: &str = "id, workspace_id, path, action, content, timestamp, base_sha, staged";
const SNAPSHOT_COLUMNS: &str = "workspace_id, path, content, sha, cached_at";
const WORKSPACE_COLUMNS: &str =
    "id, owner, repo, branch, path, default_branch, display_name, last_synced_at, opened_at";

/// One edit that landed in a remote commit.
#[derive(Debug, Clone)]
pub struct CommittedFile {
    /// The edit exactly as it was captured when the push started.
    pub edit: PendingEdit,
    /// Blob sha of the committed file; `None` for deletions or when the
    /// remote did not report one.
    pub new_sha: Option<String>,
}

/// What `apply_commit` did to the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitApplied {
    /// Edits removed because they were committed unchanged.
    pub removed: usize,
    /// Edits rewritten during the push and re-based onto the new commit.
    pub rebased: usize,
    /// Reverts made during the push, queued again against the new commit.
    pub restored: usize,
}

/// Persistent store for pending edits, snapshots and workspaces.
pub struct QueueStore {
    conn: Arc<Mutex<Connection>>,
    recent_limit: usize,
}

impl QueueStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        debug!("Opened queue store at {}", path.as_ref().display());
        Self::from_connection(conn)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            recent_limit: DEFAULT_RECENT_LIMIT,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Sets the bound of the recency list.
    #[must_use]
    pub fn with_recent_limit(mut self, limit: usize) -> Self {
        self.recent_limit = limit.max(1);
        self
    }

    /// Returns the bound of the recency list.
    pub fn recent_limit(&self) -> usize {
        self.recent_limit
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS workspaces (
                id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                repo TEXT NOT NULL,
                branch TEXT NOT NULL,
                path TEXT NOT NULL,
                default_branch TEXT NOT NULL,
                display_name TEXT NOT NULL,
                last_synced_at INTEGER,
                opened_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS pending_edits (
                id TEXT NOT NULL,
                workspace_id TEXT NOT NULL,
                path TEXT NOT NULL,
                action TEXT NOT NULL,
                content TEXT,
                timestamp INTEGER NOT NULL,
                base_sha TEXT,
                staged INTEGER NOT NULL DEFAULT 0,
                UNIQUE(workspace_id, path)
            );

            CREATE INDEX IF NOT EXISTS idx_pending_edits_ts
                ON pending_edits (workspace_id, timestamp);

            CREATE TABLE IF NOT EXISTS file_cache (
                workspace_id TEXT NOT NULL,
                path TEXT NOT NULL,
                content TEXT NOT NULL,
                sha TEXT NOT NULL,
                cached_at INTEGER NOT NULL,
                PRIMARY KEY (workspace_id, path)
            );

            CREATE TABLE IF NOT EXISTS recent_workspaces (
                workspace_id TEXT PRIMARY KEY,
                key TEXT NOT NULL,
                display_name TEXT NOT NULL,
                last_opened_at INTEGER NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    // ── Workspaces ───────────────────────────────────────────────

    /// Saves (inserts or replaces) a workspace descriptor.
    pub fn save_workspace(&self, ws: &Workspace) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO workspaces (id, owner, repo, branch, path, default_branch, display_name, last_synced_at, opened_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                ws.id.as_str(),
                ws.key.owner,
                ws.key.repo,
                ws.key.branch,
                ws.key.path,
                ws.default_branch,
                ws.display_name,
                ws.last_synced_at.as_ref().map(to_nanos),
                to_nanos(&ws.opened_at),
            ],
        )?;
        Ok(())
    }

    /// Loads a workspace descriptor.
    pub fn get_workspace(&self, id: &WorkspaceId) -> StoreResult<Option<Workspace>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE id = ?1"),
                params![id.as_str()],
                read_workspace_row,
            )
            .optional()?;
        row.map(WorkspaceRow::into_workspace).transpose()
    }

    /// Loads every open workspace, oldest first.
    pub fn list_workspaces(&self) -> StoreResult<Vec<Workspace>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {WORKSPACE_COLUMNS} FROM workspaces ORDER BY opened_at ASC"
        ))?;
        let rows = stmt.query_map([], read_workspace_row)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?.into_workspace()?);
        }
        Ok(result)
    }

    /// Records a successful sync time for a workspace.
    pub fn touch_synced(&self, id: &WorkspaceId, at: DateTime<Utc>) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE workspaces SET last_synced_at = ?2 WHERE id = ?1",
            params![id.as_str(), to_nanos(&at)],
        )?;
        Ok(changed > 0)
    }

    /// Removes a workspace with all its pending edits and cached files.
    ///
    /// The recency entry is kept so the workspace can be reopened later.
    pub fn purge_workspace(&self, id: &WorkspaceId) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let edits = tx.execute(
            "DELETE FROM pending_edits WHERE workspace_id = ?1",
            params![id.as_str()],
        )?;
        let cached = tx.execute(
            "DELETE FROM file_cache WHERE workspace_id = ?1",
            params![id.as_str()],
        )?;
        tx.execute("DELETE FROM workspaces WHERE id = ?1", params![id.as_str()])?;
        tx.commit()?;
        debug!(
            "Purged workspace {} ({} edits, {} cached files)",
            id, edits, cached
        );
        Ok(())
    }

    // ── Pending edits ────────────────────────────────────────────

    /// Inserts or replaces the pending edit for the edit's path.
    pub fn upsert_edit(&self, edit: &PendingEdit) -> StoreResult<()> {
        let conn = self.conn()?;
        upsert_edit_on(&conn, edit)
    }

    /// Loads the pending edit for a path.
    pub fn get_edit(&self, ws: &WorkspaceId, path: &str) -> StoreResult<Option<PendingEdit>> {
        let conn = self.conn()?;
        get_edit_on(&conn, ws, path)
    }

    /// Loads all pending edits of a workspace, ordered by timestamp.
    pub fn list_edits(&self, ws: &WorkspaceId) -> StoreResult<Vec<PendingEdit>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EDIT_COLUMNS} FROM pending_edits WHERE workspace_id = ?1 ORDER BY timestamp ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![ws.as_str()], read_edit_row)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?.into_edit()?);
        }
        Ok(result)
    }

    /// Deletes the pending edit for a path. Returns whether one existed.
    pub fn delete_edit(&self, ws: &WorkspaceId, path: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM pending_edits WHERE workspace_id = ?1 AND path = ?2",
            params![ws.as_str(), path],
        )?;
        Ok(changed > 0)
    }

    /// Sets the staged flag of one edit. Returns whether the edit exists.
    pub fn set_staged(&self, ws: &WorkspaceId, path: &str, staged: bool) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE pending_edits SET staged = ?3 WHERE workspace_id = ?1 AND path = ?2",
            params![ws.as_str(), path, staged],
        )?;
        Ok(changed > 0)
    }

    /// Sets the staged flag of every edit in a workspace.
    pub fn set_all_staged(&self, ws: &WorkspaceId, staged: bool) -> StoreResult<usize> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE pending_edits SET staged = ?2 WHERE workspace_id = ?1",
            params![ws.as_str(), staged],
        )?;
        Ok(changed)
    }

    // ── File snapshots ───────────────────────────────────────────

    /// Saves (inserts or replaces) a file snapshot.
    pub fn save_snapshot(&self, snapshot: &FileSnapshot) -> StoreResult<()> {
        let conn = self.conn()?;
        save_snapshot_on(&conn, snapshot)
    }

    /// Loads the snapshot for a path.
    pub fn get_snapshot(&self, ws: &WorkspaceId, path: &str) -> StoreResult<Option<FileSnapshot>> {
        let conn = self.conn()?;
        get_snapshot_on(&conn, ws, path)
    }

    /// Loads all snapshots of a workspace, ordered by path.
    pub fn list_snapshots(&self, ws: &WorkspaceId) -> StoreResult<Vec<FileSnapshot>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM file_cache WHERE workspace_id = ?1 ORDER BY path ASC"
        ))?;
        let rows = stmt.query_map(params![ws.as_str()], read_snapshot_row)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?.into_snapshot()?);
        }
        Ok(result)
    }

    /// Deletes the snapshot for a path. Returns whether one existed.
    pub fn delete_snapshot(&self, ws: &WorkspaceId, path: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM file_cache WHERE workspace_id = ?1 AND path = ?2",
            params![ws.as_str(), path],
        )?;
        Ok(changed > 0)
    }

    // ── Commit bookkeeping ───────────────────────────────────────

    /// Records a landed commit in one transaction.
    ///
    /// For every committed file the snapshot is refreshed (or dropped for a
    /// deletion). The queued edit is removed when it is still the record that
    /// was captured; an edit rewritten since capture stays queued, re-based on
    /// the committed sha, unless it now matches the committed content.
    ///
    /// An edit removed since capture was a revert to the previous snapshot.
    /// The commit undid that revert remotely, so an unstaged edit restoring
    /// the previous state is queued in its place.
    ///
    /// A write committed without a known blob sha keeps its old snapshot.
    /// Nothing is written for a workspace that has been purged.
    pub fn apply_commit(
        &self,
        ws: &WorkspaceId,
        files: &[CommittedFile],
    ) -> StoreResult<CommitApplied> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut applied = CommitApplied::default();

        let exists = tx
            .query_row(
                "SELECT 1 FROM workspaces WHERE id = ?1",
                params![ws.as_str()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            warn!("Commit landed for purged workspace {}; nothing recorded", ws);
            return Ok(applied);
        }

        for file in files {
            let path = file.edit.path.as_str();
            let previous = get_snapshot_on(&tx, ws, path)?;
            let committed_content = match (&file.edit.content, &file.new_sha) {
                (Some(content), Some(sha)) if !file.edit.is_delete() => {
                    let snapshot = FileSnapshot::new(ws.clone(), path, content.clone(), sha.clone());
                    save_snapshot_on(&tx, &snapshot)?;
                    Some(content.as_str())
                }
                (Some(content), None) if !file.edit.is_delete() => {
                    warn!("No blob sha reported for {}; keeping its snapshot", path);
                    Some(content.as_str())
                }
                _ => {
                    tx.execute(
                        "DELETE FROM file_cache WHERE workspace_id = ?1 AND path = ?2",
                        params![ws.as_str(), path],
                    )?;
                    None
                }
            };

            // Sha the remote now holds for the path, as far as it is known.
            let base_sha = match committed_content {
                Some(_) => file
                    .new_sha
                    .clone()
                    .or_else(|| previous.as_ref().map(|p| p.sha.clone())),
                None => None,
            };

            let removed = tx.execute(
                "DELETE FROM pending_edits WHERE workspace_id = ?1 AND path = ?2 AND id = ?3 AND timestamp = ?4",
                params![
                    ws.as_str(),
                    path,
                    file.edit.id.to_string(),
                    to_nanos(&file.edit.timestamp)
                ],
            )?;
            if removed > 0 {
                applied.removed += 1;
                continue;
            }

            match get_edit_on(&tx, ws, path)? {
                Some(current) => {
                    applied.rebased += rebase_edit(&tx, current, base_sha, committed_content)?;
                }
                None => {
                    applied.restored += restore_reverted(
                        &tx,
                        ws,
                        path,
                        previous,
                        base_sha,
                        committed_content,
                    )?;
                }
            }
        }

        tx.commit()?;
        debug!(
            "Applied commit to {}: {} removed, {} re-based, {} restored",
            ws, applied.removed, applied.rebased, applied.restored
        );
        Ok(applied)
    }

    // ── Recent workspaces ────────────────────────────────────────

    /// Moves a workspace to the front of the recency list, evicting the
    /// oldest entries beyond the bound.
    pub fn record_recent(&self, entry: &RecentWorkspace) -> StoreResult<()> {
        let key = serde_json::to_string(&entry.key)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO recent_workspaces (workspace_id, key, display_name, last_opened_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.workspace_id.as_str(),
                key,
                entry.display_name,
                to_nanos(&entry.last_opened_at),
            ],
        )?;
        tx.execute(
            "DELETE FROM recent_workspaces WHERE workspace_id NOT IN (
                SELECT workspace_id FROM recent_workspaces ORDER BY last_opened_at DESC LIMIT ?1
            )",
            params![self.recent_limit as i64],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Loads the recency list, most recent first.
    pub fn list_recent(&self) -> StoreResult<Vec<RecentWorkspace>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT workspace_id, key, display_name, last_opened_at FROM recent_workspaces
             ORDER BY last_opened_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let key: String = row.get(1)?;
            let display_name: String = row.get(2)?;
            let opened: i64 = row.get(3)?;
            Ok((id, key, display_name, opened))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (id, key, display_name, opened) = row?;
            let key: WorkspaceKey = serde_json::from_str(&key)?;
            result.push(RecentWorkspace {
                workspace_id: WorkspaceId::parse(&id)?,
                key,
                display_name,
                last_opened_at: from_nanos(opened),
            });
        }
        Ok(result)
    }

    /// Removes a workspace from the recency list.
    pub fn remove_recent(&self, id: &WorkspaceId) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM recent_workspaces WHERE workspace_id = ?1",
            params![id.as_str()],
        )?;
        Ok(changed > 0)
    }
}

fn rebase_edit(
    tx: &Transaction<'_>,
    mut edit: PendingEdit,
    base_sha: Option<String>,
    committed_content: Option<&str>,
) -> StoreResult<usize> {
    if !edit.is_delete() && committed_content.is_some() && edit.content.as_deref() == committed_content {
        tx.execute(
            "DELETE FROM pending_edits WHERE workspace_id = ?1 AND path = ?2",
            params![edit.workspace_id.as_str(), edit.path],
        )?;
        return Ok(0);
    }

    edit.action = match (&edit.action, committed_content) {
        (EditAction::Delete, _) => EditAction::Delete,
        (_, Some(_)) => EditAction::Update,
        (_, None) => EditAction::Create,
    };
    edit.base_sha = base_sha;
    upsert_edit_on(tx, &edit)?;
    Ok(1)
}

fn restore_reverted(
    tx: &Transaction<'_>,
    ws: &WorkspaceId,
    path: &str,
    previous: Option<FileSnapshot>,
    base_sha: Option<String>,
    committed_content: Option<&str>,
) -> StoreResult<usize> {
    let edit = match (previous, committed_content) {
        (Some(previous), Some(committed)) if previous.content == committed => return Ok(0),
        (Some(previous), Some(_)) => PendingEdit::new(
            ws.clone(),
            path,
            EditAction::Update,
            Some(previous.content),
            base_sha,
        ),
        (Some(previous), None) => {
            PendingEdit::new(ws.clone(), path, EditAction::Create, Some(previous.content), None)
        }
        (None, Some(_)) => PendingEdit::new(ws.clone(), path, EditAction::Delete, None, base_sha),
        (None, None) => return Ok(0),
    };
    debug!("Restoring {} reverted during the push", path);
    upsert_edit_on(tx, &edit)?;
    Ok(1)
}

fn upsert_edit_on(conn: &Connection, edit: &PendingEdit) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO pending_edits (id, workspace_id, path, action, content, timestamp, base_sha, staged)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(workspace_id, path) DO UPDATE SET
            id = excluded.id,
            action = excluded.action,
            content = excluded.content,
            timestamp = excluded.timestamp,
            base_sha = excluded.base_sha,
            staged = excluded.staged",
        params![
            edit.id.to_string(),
            edit.workspace_id.as_str(),
            edit.path,
            edit.action.as_str(),
            edit.content,
            to_nanos(&edit.timestamp),
            edit.base_sha,
            edit.staged,
        ],
    )?;
    Ok(())
}

fn get_edit_on(conn: &Connection, ws: &WorkspaceId, path: &str) -> StoreResult<Option<PendingEdit>> {
    let row = conn
        .query_row(
            &format!("SELECT {EDIT_COLUMNS} FROM pending_edits WHERE workspace_id = ?1 AND path = ?2"),
            params![ws.as_str(), path],
            read_edit_row,
        )
        .optional()?;
    row.map(EditRow::into_edit).transpose()
}

fn get_snapshot_on(
    conn: &Connection,
    ws: &WorkspaceId,
    path: &str,
) -> StoreResult<Option<FileSnapshot>> {
    let row = conn
        .query_row(
            &format!("SELECT {SNAPSHOT_COLUMNS} FROM file_cache WHERE workspace_id = ?1 AND path = ?2"),
            params![ws.as_str(), path],
            read_snapshot_row,
        )
        .optional()?;
    row.map(SnapshotRow::into_snapshot).transpose()
}

fn save_snapshot_on(conn: &Connection, snapshot: &FileSnapshot) -> StoreResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO file_cache (workspace_id, path, content, sha, cached_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            snapshot.workspace_id.as_str(),
            snapshot.path,
            snapshot.content,
            snapshot.sha,
            to_nanos(&snapshot.cached_at),
        ],
    )?;
    Ok(())
}

// ── Row decoding ─────────────────────────────────────────────────

struct EditRow {
    id: String,
    workspace_id: String,
    path: String,
    action: String,
    content: Option<String>,
    timestamp: i64,
    base_sha: Option<String>,
    staged: bool,
}

fn read_edit_row(row: &Row<'_>) -> rusqlite::Result<EditRow> {
    Ok(EditRow {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        path: row.get(2)?,
        action: row.get(3)?,
        content: row.get(4)?,
        timestamp: row.get(5)?,
        base_sha: row.get(6)?,
        staged: row.get(7)?,
    })
}

impl EditRow {
    fn into_edit(self) -> StoreResult<PendingEdit> {
        Ok(PendingEdit {
            id: EditId::parse(&self.id)
                .map_err(|e| StoreError::InvalidData(format!("invalid edit id: {e}")))?,
            workspace_id: WorkspaceId::parse(&self.workspace_id)?,
            path: self.path,
            action: self.action.parse()?,
            content: self.content,
            timestamp: from_nanos(self.timestamp),
            base_sha: self.base_sha,
            staged: self.staged,
        })
    }
}

struct SnapshotRow {
    workspace_id: String,
    path: String,
    content: String,
    sha: String,
    cached_at: i64,
}

fn read_snapshot_row(row: &Row<'_>) -> rusqlite::Result<SnapshotRow> {
    Ok(SnapshotRow {
        workspace_id: row.get(0)?,
        path: row.get(1)?,
        content: row.get(2)?,
        sha: row.get(3)?,
        cached_at: row.get(4)?,
    })
}

impl SnapshotRow {
    fn into_snapshot(self) -> StoreResult<FileSnapshot> {
        Ok(FileSnapshot {
            workspace_id: WorkspaceId::parse(&self.workspace_id)?,
            path: self.path,
            content: self.content,
            sha: self.sha,
            cached_at: from_nanos(self.cached_at),
        })
    }
}

struct WorkspaceRow {
    id: String,
    key: WorkspaceKey,
    default_branch: String,
    display_name: String,
    last_synced_at: Option<i64>,
    opened_at: i64,
}

fn read_workspace_row(row: &Row<'_>) -> rusqlite::Result<WorkspaceRow> {
    Ok(WorkspaceRow {
        id: row.get(0)?,
        key: WorkspaceKey {
            owner: row.get(1)?,
            repo: row.get(2)?,
            branch: row.get(3)?,
            path: row.get(4)?,
        },
        default_branch: row.get(5)?,
        display_name: row.get(6)?,
        last_synced_at: row.get(7)?,
        opened_at: row.get(8)?,
    })
}

impl WorkspaceRow {
    fn into_workspace(self) -> StoreResult<Workspace> {
        Ok(Workspace {
            id: WorkspaceId::parse(&self.id)?,
            key: self.key,
            default_branch: self.default_branch,
            display_name: self.display_name,
            last_synced_at: self.last_synced_at.map(from_nanos),
            opened_at: from_nanos(self.opened_at),
        })
    }
}

fn to_nanos(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

fn from_nanos(nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(
        nanos.div_euclid(1_000_000_000),
        nanos.rem_euclid(1_000_000_000) as u32,
    )
    .unwrap_or_default()
}
