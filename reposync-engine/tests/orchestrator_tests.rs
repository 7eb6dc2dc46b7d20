use async_trait::async_trait;
use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use reposync_engine::{
    normalize_path, EngineConfig, SyncError, SyncEvent, SyncOrchestrator, SyncOutcome,
    WorkspaceManager, WriteOutcome,
};
use reposync_remote::{
    CommitResult, FileChange, MemoryRemote, RateLimit, RemoteError, RemoteFile, RemoteOp,
    RemoteRepository, RemoteResult, RepoRef,
};
use reposync_store::QueueStore;
use reposync_types::{
    ConflictResolution, EditAction, FileSnapshot, Resolution, SyncStatus, TreeEntry, Workspace,
    WorkspaceKey,
};
use std::sync::Arc;
use tokio::sync::Notify;

// ── Fixtures ────────────────────────────────────────────────────

struct Fixture<R: RemoteRepository> {
    store: Arc<QueueStore>,
    remote: Arc<R>,
    orch: Arc<SyncOrchestrator<R>>,
    ws: Workspace,
}

fn repo() -> RepoRef {
    RepoRef::new("acme", "schemas")
}

fn seed(remote: &MemoryRemote) {
    remote.create_repo(
        &repo(),
        "main",
        &[
            ("models/a.yaml", "a: 1\n"),
            ("models/b.yaml", "b: 1\n"),
            ("README.md", "readme"),
        ],
    );
}

fn fixture_with<R: RemoteRepository>(remote: Arc<R>) -> Fixture<R> {
    let store = Arc::new(QueueStore::open_in_memory().unwrap());
    let ws = Workspace::new(WorkspaceKey::new("acme", "schemas", "main", "models"), "main");
    store.save_workspace(&ws).unwrap();
    let orch = Arc::new(SyncOrchestrator::new(
        ws.clone(),
        Arc::clone(&store),
        Arc::clone(&remote),
        "Update via tests",
    ));
    Fixture {
        store,
        remote,
        orch,
        ws,
    }
}

fn fixture() -> Fixture<MemoryRemote> {
    let remote = MemoryRemote::new();
    seed(&remote);
    fixture_with(Arc::new(remote))
}

impl<R: RemoteRepository> Fixture<R> {
    fn snapshot(&self, path: &str) -> Option<FileSnapshot> {
        self.store.get_snapshot(&self.ws.id, path).unwrap()
    }

    fn edits(&self) -> Vec<reposync_types::PendingEdit> {
        self.orch.pending_edits().unwrap()
    }
}

fn remote_sha(remote: &MemoryRemote, path: &str) -> String {
    remote.file_at(&repo(), "main", path).unwrap().1
}

/// Remote whose `gated` operation parks until released, to hold a cycle
/// in flight.
struct GatedRemote {
    inner: MemoryRemote,
    gated: RemoteOp,
    entered: Notify,
    release: Notify,
}

impl GatedRemote {
    fn new(gated: RemoteOp) -> Self {
        let inner = MemoryRemote::new();
        seed(&inner);
        Self {
            inner,
            gated,
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    async fn pass(&self, op: RemoteOp) {
        if op == self.gated {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }
}

#[async_trait]
impl RemoteRepository for GatedRemote {
    fn provider_name(&self) -> &'static str {
        "Gated"
    }

    async fn read_file(&self, repo: &RepoRef, path: &str, git_ref: &str) -> RemoteResult<RemoteFile> {
        self.pass(RemoteOp::ReadFile).await;
        self.inner.read_file(repo, path, git_ref).await
    }

    async fn branch_head(&self, repo: &RepoRef, branch: &str) -> RemoteResult<String> {
        self.pass(RemoteOp::BranchHead).await;
        self.inner.branch_head(repo, branch).await
    }

    async fn default_branch(&self, repo: &RepoRef) -> RemoteResult<String> {
        self.pass(RemoteOp::DefaultBranch).await;
        self.inner.default_branch(repo).await
    }

    async fn list_tree(&self, repo: &RepoRef, git_ref: &str, prefix: &str) -> RemoteResult<Vec<TreeEntry>> {
        self.pass(RemoteOp::ListTree).await;
        self.inner.list_tree(repo, git_ref, prefix).await
    }

    async fn commit_files(
        &self,
        repo: &RepoRef,
        branch: &str,
        parent_sha: &str,
        changes: &[FileChange],
        message: &str,
    ) -> RemoteResult<CommitResult> {
        self.pass(RemoteOp::CommitFiles).await;
        self.inner
            .commit_files(repo, branch, parent_sha, changes, message)
            .await
    }

    async fn rate_limit(&self) -> Option<RateLimit> {
        self.inner.rate_limit().await
    }
}

// ── Merge-on-write ──────────────────────────────────────────────

#[test]
fn repeated_writes_merge_into_one_edit() {
    let f = fixture();

    assert_eq!(
        f.orch.write_file("new.yaml", "v1").unwrap(),
        WriteOutcome::Queued(EditAction::Create)
    );
    f.orch.write_file("new.yaml", "v2").unwrap();
    f.orch.write_file("/new.yaml", "v3").unwrap();

    let edits = f.edits();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].path, "new.yaml");
    assert_eq!(edits[0].action, EditAction::Create);
    assert_eq!(edits[0].content.as_deref(), Some("v3"));
    assert_eq!(edits[0].base_sha, None);
}

#[test]
fn writing_same_content_again_is_unchanged() {
    let f = fixture();
    f.orch.write_file("new.yaml", "v1").unwrap();
    let before = f.edits();

    assert_eq!(f.orch.write_file("new.yaml", "v1").unwrap(), WriteOutcome::Unchanged);
    assert_eq!(f.edits(), before);
}

#[tokio::test]
async fn writing_cached_content_reverts_edit() {
    let f = fixture();
    assert_eq!(f.orch.read_file("a.yaml").await.unwrap(), "a: 1\n");
    let sha = remote_sha(&f.remote, "models/a.yaml");

    assert_eq!(
        f.orch.write_file("a.yaml", "a: 2\n").unwrap(),
        WriteOutcome::Queued(EditAction::Update)
    );
    let edit = &f.edits()[0];
    assert_eq!(edit.base_sha.as_deref(), Some(sha.as_str()));

    assert_eq!(f.orch.write_file("a.yaml", "a: 1\n").unwrap(), WriteOutcome::Reverted);
    assert!(f.edits().is_empty());

    // Snapshot untouched by local edits.
    assert_eq!(f.snapshot("a.yaml").unwrap().content, "a: 1\n");
    assert_eq!(f.orch.write_file("a.yaml", "a: 1\n").unwrap(), WriteOutcome::Unchanged);
}

#[tokio::test]
async fn rewrite_keeps_staged_flag_and_base() {
    let f = fixture();
    f.orch.read_file("a.yaml").await.unwrap();
    f.orch.write_file("a.yaml", "x").unwrap();
    f.orch.stage(&["a.yaml"]).unwrap();

    f.orch.write_file("a.yaml", "y").unwrap();
    let edit = &f.edits()[0];
    assert!(edit.staged);
    assert_eq!(edit.content.as_deref(), Some("y"));
    assert_eq!(edit.base_sha, Some(remote_sha(&f.remote, "models/a.yaml")));
}

#[test]
fn invalid_paths_are_rejected() {
    let f = fixture();
    for path in ["", "/", "a//b", "../etc/passwd", "a/./b"] {
        assert!(matches!(
            f.orch.write_file(path, "x"),
            Err(SyncError::InvalidPath(_))
        ));
    }
    assert_eq!(normalize_path("/dir/file.yaml/").unwrap(), "dir/file.yaml");
}

// ── Deletes and reads ───────────────────────────────────────────

#[tokio::test]
async fn delete_requires_known_file() {
    let f = fixture();
    assert!(matches!(f.orch.delete_file("a.yaml"), Err(SyncError::NotFound(_))));

    f.orch.read_file("a.yaml").await.unwrap();
    assert_eq!(
        f.orch.delete_file("a.yaml").unwrap(),
        WriteOutcome::Queued(EditAction::Delete)
    );
    assert_eq!(f.orch.delete_file("a.yaml").unwrap(), WriteOutcome::Unchanged);

    let edit = &f.edits()[0];
    assert!(edit.is_delete());
    assert_eq!(edit.content, None);
    assert!(matches!(f.orch.read_file("a.yaml").await, Err(SyncError::NotFound(_))));
}

#[test]
fn deleting_local_only_file_drops_its_edit() {
    let f = fixture();
    f.orch.write_file("draft.yaml", "draft").unwrap();
    assert_eq!(f.orch.delete_file("draft.yaml").unwrap(), WriteOutcome::Reverted);
    assert!(f.edits().is_empty());
}

#[tokio::test]
async fn read_prefers_queue_then_cache_then_remote() {
    let f = fixture();

    assert_eq!(f.orch.read_file("b.yaml").await.unwrap(), "b: 1\n");
    assert!(f.snapshot("b.yaml").is_some());

    // Cache hit: the remote is not consulted again.
    f.remote
        .set_remote_file(&repo(), "main", "models/b.yaml", Some("b: remote\n"))
        .unwrap();
    assert_eq!(f.orch.read_file("b.yaml").await.unwrap(), "b: 1\n");

    f.orch.write_file("b.yaml", "b: local\n").unwrap();
    assert_eq!(f.orch.read_file("b.yaml").await.unwrap(), "b: local\n");

    assert!(matches!(
        f.orch.read_file("missing.yaml").await,
        Err(SyncError::NotFound(_))
    ));
}

#[tokio::test]
async fn offline_reads_use_cache_only() {
    let f = fixture();
    f.orch.read_file("a.yaml").await.unwrap();
    f.orch.set_online(false).await;

    assert_eq!(f.orch.read_file("a.yaml").await.unwrap(), "a: 1\n");
    assert!(matches!(f.orch.read_file("b.yaml").await, Err(SyncError::Offline)));
}

// ── Staging ─────────────────────────────────────────────────────

#[test]
fn staging_unknown_path_changes_nothing() {
    let f = fixture();
    f.orch.write_file("one.yaml", "1").unwrap();

    let err = f.orch.stage(&["one.yaml", "nope.yaml"]).unwrap_err();
    assert!(matches!(err, SyncError::NotFound(ref p) if p == "nope.yaml"));
    assert!(!f.edits()[0].staged);

    assert_eq!(f.orch.stage(&["one.yaml"]).unwrap(), 1);
    assert!(f.edits()[0].staged);
    assert_eq!(f.orch.unstage(&["one.yaml"]).unwrap(), 1);
    assert!(!f.edits()[0].staged);
}

#[tokio::test]
async fn diff_shows_cached_and_queued_content() {
    let f = fixture();
    f.orch.read_file("a.yaml").await.unwrap();
    f.orch.write_file("a.yaml", "a: 2\n").unwrap();
    f.orch.write_file("c.yaml", "c: 1\n").unwrap();

    let diff = f.orch.diff("a.yaml").unwrap().unwrap();
    assert_eq!(diff.original.as_deref(), Some("a: 1\n"));
    assert_eq!(diff.modified.as_deref(), Some("a: 2\n"));

    let diffs = f.orch.diffs().unwrap();
    assert_eq!(diffs.len(), 2);
    assert_eq!(diffs[1].path, "c.yaml");
    assert_eq!(diffs[1].original, None);

    assert!(f.orch.diff("b.yaml").unwrap().is_none());
}

// ── Push ────────────────────────────────────────────────────────

#[tokio::test]
async fn push_commits_only_staged_edits() {
    let f = fixture();
    f.orch.read_file("a.yaml").await.unwrap();
    f.orch.write_file("a.yaml", "a: 2\n").unwrap();
    f.orch.write_file("c.yaml", "c: 1\n").unwrap();
    f.orch.write_file("d.yaml", "d: 1\n").unwrap();
    f.orch.stage(&["a.yaml", "c.yaml"]).unwrap();

    let outcome = f.orch.push(Some("Two files")).await.unwrap();
    let SyncOutcome::Committed(summary) = outcome else {
        panic!("expected a commit, got {outcome:?}");
    };
    assert_eq!(summary.files, 2);
    assert_eq!(summary.rebased, 0);
    assert_eq!(f.remote.commits_created(), 1);

    let edits = f.edits();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].path, "d.yaml");
    assert!(!edits[0].staged);
    assert!(f.remote.file_at(&repo(), "main", "models/d.yaml").is_none());

    let snapshot = f.snapshot("c.yaml").unwrap();
    assert_eq!(snapshot.content, "c: 1\n");
    assert_eq!(snapshot.sha, remote_sha(&f.remote, "models/c.yaml"));
    assert_eq!(f.orch.status(), SyncStatus::Idle);
}

#[tokio::test]
async fn push_with_nothing_staged_is_a_no_op() {
    let f = fixture();
    f.orch.write_file("c.yaml", "c").unwrap();
    assert_eq!(f.orch.push(None).await.unwrap(), SyncOutcome::NothingToPush);
    assert_eq!(f.remote.commits_created(), 0);
    assert_eq!(f.edits().len(), 1);
}

#[tokio::test]
async fn pushed_delete_removes_file_and_snapshot() {
    let f = fixture();
    f.orch.read_file("b.yaml").await.unwrap();
    f.orch.delete_file("b.yaml").unwrap();
    f.orch.stage_all().unwrap();

    f.orch.push(None).await.unwrap();
    assert!(f.remote.file_at(&repo(), "main", "models/b.yaml").is_none());
    assert!(f.snapshot("b.yaml").is_none());
    assert!(f.edits().is_empty());
}

#[tokio::test]
async fn failed_commit_leaves_queue_untouched() {
    let f = fixture();
    f.orch.read_file("a.yaml").await.unwrap();
    f.orch.write_file("a.yaml", "a: 2\n").unwrap();
    f.orch.write_file("c.yaml", "c: 1\n").unwrap();
    f.orch.stage_all().unwrap();
    let before = f.edits();

    f.remote.fail_next(
        RemoteOp::CommitFiles,
        RemoteError::Network("connection reset".to_string()),
    );
    let err = f.orch.push(None).await.unwrap_err();
    assert!(err.is_retryable());

    assert_eq!(f.edits(), before);
    assert_eq!(f.snapshot("a.yaml").unwrap().content, "a: 1\n");
    assert!(f.snapshot("c.yaml").is_none());
    assert_eq!(f.orch.status(), SyncStatus::Error);
    assert!(f.orch.last_error().await.unwrap().contains("connection reset"));

    // Retrying after the failure commits everything at once.
    f.orch.push(None).await.unwrap();
    assert!(f.edits().is_empty());
    assert_eq!(f.orch.last_error().await, None);
    assert_eq!(f.orch.status(), SyncStatus::Idle);
}

#[tokio::test]
async fn moved_branch_asks_for_pull() {
    let f = fixture();
    f.orch.write_file("c.yaml", "c").unwrap();
    f.orch.stage_all().unwrap();

    f.remote.fail_next(
        RemoteOp::CommitFiles,
        RemoteError::RefMoved {
            branch: "main".to_string(),
            expected: "old".to_string(),
            actual: Some("new".to_string()),
        },
    );
    let err = f.orch.push(None).await.unwrap_err();
    assert!(matches!(err, SyncError::Remote(RemoteError::RefMoved { .. })));
    assert_eq!(f.orch.status(), SyncStatus::Error);
    assert!(f.orch.last_error().await.unwrap().contains("pull"));
    assert_eq!(f.edits().len(), 1);
}

#[tokio::test]
async fn edit_rewritten_during_push_stays_queued() {
    let f = fixture_with(Arc::new(GatedRemote::new(RemoteOp::CommitFiles)));
    f.orch.write_file("c.yaml", "v1").unwrap();
    f.orch.stage_all().unwrap();

    let orch = Arc::clone(&f.orch);
    let push = tokio::spawn(async move { orch.push(None).await });
    f.remote.entered.notified().await;

    // Written after the staged set was captured.
    f.orch.write_file("c.yaml", "v2").unwrap();
    f.remote.release.notify_one();

    let outcome = push.await.unwrap().unwrap();
    let SyncOutcome::Committed(summary) = outcome else {
        panic!("expected a commit, got {outcome:?}");
    };
    assert_eq!(summary.rebased, 1);

    let committed = f.remote.inner.file_at(&repo(), "main", "models/c.yaml").unwrap();
    assert_eq!(committed.0, "v1");

    let edits = f.edits();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].content.as_deref(), Some("v2"));
    assert_eq!(edits[0].action, EditAction::Update);
    assert_eq!(edits[0].base_sha.as_deref(), Some(committed.1.as_str()));
    assert_eq!(f.snapshot("c.yaml").unwrap().content, "v1");
}

#[tokio::test]
async fn revert_written_during_push_is_queued_again() {
    let f = fixture_with(Arc::new(GatedRemote::new(RemoteOp::CommitFiles)));
    f.orch.read_file("a.yaml").await.unwrap();
    f.orch.write_file("a.yaml", "a: 2\n").unwrap();
    f.orch.stage_all().unwrap();

    let orch = Arc::clone(&f.orch);
    let push = tokio::spawn(async move { orch.push(None).await });
    f.remote.entered.notified().await;

    assert_eq!(f.orch.write_file("a.yaml", "a: 1\n").unwrap(), WriteOutcome::Reverted);
    f.remote.release.notify_one();

    let outcome = push.await.unwrap().unwrap();
    let SyncOutcome::Committed(summary) = outcome else {
        panic!("expected a commit, got {outcome:?}");
    };
    assert_eq!(summary.restored, 1);

    let committed = f.remote.inner.file_at(&repo(), "main", "models/a.yaml").unwrap();
    assert_eq!(committed.0, "a: 2\n");
    let edits = f.edits();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].action, EditAction::Update);
    assert_eq!(edits[0].content.as_deref(), Some("a: 1\n"));
    assert_eq!(edits[0].base_sha.as_deref(), Some(committed.1.as_str()));
    assert!(!edits[0].staged);
    assert_eq!(f.orch.read_file("a.yaml").await.unwrap(), "a: 1\n");

    f.orch.stage_all().unwrap();
    f.remote.release.notify_one();
    assert!(matches!(f.orch.push(None).await.unwrap(), SyncOutcome::Committed(_)));
    assert_eq!(f.remote.inner.file_at(&repo(), "main", "models/a.yaml").unwrap().0, "a: 1\n");
    assert!(f.edits().is_empty());
}

#[tokio::test]
async fn deletion_undone_during_push_is_queued_again() {
    let f = fixture_with(Arc::new(GatedRemote::new(RemoteOp::CommitFiles)));
    f.orch.read_file("b.yaml").await.unwrap();
    f.orch.delete_file("b.yaml").unwrap();
    f.orch.stage_all().unwrap();

    let orch = Arc::clone(&f.orch);
    let push = tokio::spawn(async move { orch.push(None).await });
    f.remote.entered.notified().await;

    assert_eq!(f.orch.write_file("b.yaml", "b: 1\n").unwrap(), WriteOutcome::Reverted);
    f.remote.release.notify_one();
    push.await.unwrap().unwrap();

    assert!(f.remote.inner.file_at(&repo(), "main", "models/b.yaml").is_none());
    assert!(f.snapshot("b.yaml").is_none());
    let edits = f.edits();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].action, EditAction::Create);
    assert_eq!(edits[0].content.as_deref(), Some("b: 1\n"));
    assert_eq!(edits[0].base_sha, None);
}

#[tokio::test]
async fn create_dropped_during_push_is_queued_as_delete() {
    let f = fixture_with(Arc::new(GatedRemote::new(RemoteOp::CommitFiles)));
    f.orch.write_file("c.yaml", "v1").unwrap();
    f.orch.stage_all().unwrap();

    let orch = Arc::clone(&f.orch);
    let push = tokio::spawn(async move { orch.push(None).await });
    f.remote.entered.notified().await;

    assert_eq!(f.orch.delete_file("c.yaml").unwrap(), WriteOutcome::Reverted);
    f.remote.release.notify_one();
    push.await.unwrap().unwrap();

    let committed = f.remote.inner.file_at(&repo(), "main", "models/c.yaml").unwrap();
    let edits = f.edits();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].action, EditAction::Delete);
    assert_eq!(edits[0].base_sha.as_deref(), Some(committed.1.as_str()));
}

#[tokio::test]
async fn close_waits_for_push_and_leaves_nothing_behind() {
    let store = Arc::new(QueueStore::open_in_memory().unwrap());
    let remote = Arc::new(GatedRemote::new(RemoteOp::CommitFiles));
    let manager = Arc::new(WorkspaceManager::new(
        Arc::clone(&store),
        Arc::clone(&remote),
        EngineConfig::default(),
    ));
    let orch = manager
        .open_workspace("acme", "schemas", Some("main"), "models")
        .await
        .unwrap();
    let id = orch.workspace_id().clone();
    orch.write_file("c.yaml", "v1").unwrap();
    orch.stage_all().unwrap();

    let pushing = Arc::clone(&orch);
    let push = tokio::spawn(async move { pushing.push(None).await });
    remote.entered.notified().await;

    let closing = Arc::clone(&manager);
    let close_id = id.clone();
    let close = tokio::spawn(async move { closing.close_workspace(&close_id).await });
    while manager.get(&id).await.is_some() {
        tokio::task::yield_now().await;
    }
    // Closing waits for the push before purging.
    assert!(store.get_workspace(&id).unwrap().is_some());
    remote.release.notify_one();

    assert!(matches!(push.await.unwrap().unwrap(), SyncOutcome::Committed(_)));
    close.await.unwrap().unwrap();

    assert!(store.get_workspace(&id).unwrap().is_none());
    assert!(store.list_snapshots(&id).unwrap().is_empty());
    assert!(store.list_edits(&id).unwrap().is_empty());

    assert!(orch.is_closed());
    assert!(matches!(
        orch.write_file("d.yaml", "x"),
        Err(SyncError::WorkspaceNotFound(_))
    ));
    assert!(matches!(
        orch.pull().await,
        Err(SyncError::WorkspaceNotFound(_))
    ));
    assert!(store.list_edits(&id).unwrap().is_empty());
}

#[tokio::test]
async fn second_cycle_while_syncing_is_a_no_op() {
    let f = fixture_with(Arc::new(GatedRemote::new(RemoteOp::CommitFiles)));
    f.orch.write_file("c.yaml", "v1").unwrap();
    f.orch.stage_all().unwrap();

    let orch = Arc::clone(&f.orch);
    let push = tokio::spawn(async move { orch.sync(None).await });
    f.remote.entered.notified().await;

    assert_eq!(f.orch.status(), SyncStatus::Syncing);
    assert_eq!(f.orch.pull().await.unwrap(), SyncOutcome::AlreadySyncing);
    assert_eq!(f.orch.push(None).await.unwrap(), SyncOutcome::AlreadySyncing);
    assert_eq!(f.orch.sync(None).await.unwrap(), SyncOutcome::AlreadySyncing);

    f.remote.release.notify_one();
    assert!(matches!(push.await.unwrap().unwrap(), SyncOutcome::Committed(_)));
    assert_eq!(f.remote.inner.commits_created(), 1);
}

// ── Pull and conflicts ──────────────────────────────────────────

#[tokio::test]
async fn clean_pull_refreshes_tree_and_cache() {
    let f = fixture();
    f.orch.read_file("a.yaml").await.unwrap();
    f.orch.read_file("b.yaml").await.unwrap();
    f.remote
        .set_remote_file(&repo(), "main", "models/b.yaml", Some("b: 2\n"))
        .unwrap();
    f.remote
        .set_remote_file(&repo(), "main", "models/a.yaml", None)
        .unwrap();
    f.remote
        .set_remote_file(&repo(), "main", "models/c.yaml", Some("c: 1\n"))
        .unwrap();

    assert_eq!(f.orch.pull().await.unwrap(), SyncOutcome::UpToDate);
    assert_eq!(f.snapshot("b.yaml").unwrap().content, "b: 2\n");
    assert!(f.snapshot("a.yaml").is_none());

    let tree: Vec<String> = f.orch.file_tree().await.into_iter().map(|e| e.path).collect();
    assert_eq!(tree, vec!["b.yaml", "c.yaml"]);
    assert_eq!(f.orch.status(), SyncStatus::Idle);
}

#[tokio::test]
async fn new_files_and_matching_bases_never_conflict() {
    let f = fixture();
    f.orch.read_file("a.yaml").await.unwrap();
    f.orch.write_file("a.yaml", "a: 2\n").unwrap();
    f.orch.write_file("fresh.yaml", "new").unwrap();

    assert_eq!(f.orch.pull().await.unwrap(), SyncOutcome::UpToDate);
    assert!(f.orch.conflicts().await.is_empty());
    assert_eq!(f.edits().len(), 2);
}

#[tokio::test]
async fn diverged_base_blocks_push_until_resolved() {
    let f = fixture();
    f.orch.read_file("a.yaml").await.unwrap();
    let old_sha = remote_sha(&f.remote, "models/a.yaml");
    f.orch.write_file("a.yaml", "mine").unwrap();
    f.orch.stage_all().unwrap();
    f.remote
        .set_remote_file(&repo(), "main", "models/a.yaml", Some("theirs"))
        .unwrap();

    let outcome = f.orch.sync(None).await.unwrap();
    let SyncOutcome::Conflicts(conflicts) = outcome else {
        panic!("expected conflicts, got {outcome:?}");
    };
    assert_eq!(conflicts.len(), 1);
    let conflict = &conflicts[0];
    assert_eq!(conflict.path, "a.yaml");
    assert_eq!(conflict.local_content.as_deref(), Some("mine"));
    assert_eq!(conflict.remote_content.as_deref(), Some("theirs"));
    assert_eq!(conflict.local_sha, old_sha);
    assert_eq!(f.orch.status(), SyncStatus::Conflict);
    assert_eq!(f.remote.commits_created(), 0);

    assert!(matches!(f.orch.push(None).await, Err(SyncError::ConflictsPending(1))));
    assert!(matches!(f.orch.sync(None).await, Err(SyncError::ConflictsPending(1))));
    // Local writes are still accepted.
    f.orch.write_file("other.yaml", "x").unwrap();
}

#[tokio::test]
async fn use_remote_discards_local_edit() {
    let f = fixture();
    f.orch.read_file("a.yaml").await.unwrap();
    f.orch.write_file("a.yaml", "mine").unwrap();
    f.remote
        .set_remote_file(&repo(), "main", "models/a.yaml", Some("theirs"))
        .unwrap();
    f.orch.pull().await.unwrap();

    let remaining = f
        .orch
        .resolve_conflicts(&[ConflictResolution::new("a.yaml", Resolution::UseRemote)])
        .await
        .unwrap();
    assert_eq!(remaining, 0);
    assert!(f.edits().is_empty());
    assert_eq!(f.orch.read_file("a.yaml").await.unwrap(), "theirs");
    assert_eq!(f.orch.status(), SyncStatus::Idle);
}

#[tokio::test]
async fn manual_resolution_replaces_content() {
    let f = fixture();
    f.orch.read_file("a.yaml").await.unwrap();
    f.orch.write_file("a.yaml", "mine").unwrap();
    f.remote
        .set_remote_file(&repo(), "main", "models/a.yaml", Some("theirs"))
        .unwrap();
    f.orch.pull().await.unwrap();

    f.orch
        .resolve_conflicts(&[ConflictResolution::new(
            "a.yaml",
            Resolution::Manual("merged".to_string()),
        )])
        .await
        .unwrap();

    let edit = &f.edits()[0];
    assert_eq!(edit.content.as_deref(), Some("merged"));
    assert_eq!(edit.base_sha, Some(remote_sha(&f.remote, "models/a.yaml")));

    f.orch.stage_all().unwrap();
    f.orch.push(None).await.unwrap();
    assert_eq!(f.remote.file_at(&repo(), "main", "models/a.yaml").unwrap().0, "merged");
}

#[tokio::test]
async fn remote_deletion_conflicts_and_keep_local_recreates() {
    let f = fixture();
    f.orch.read_file("b.yaml").await.unwrap();
    f.orch.write_file("b.yaml", "mine").unwrap();
    f.remote
        .set_remote_file(&repo(), "main", "models/b.yaml", None)
        .unwrap();

    let SyncOutcome::Conflicts(conflicts) = f.orch.pull().await.unwrap() else {
        panic!("expected conflicts");
    };
    assert_eq!(conflicts[0].remote_sha, None);
    assert_eq!(conflicts[0].remote_content, None);

    f.orch
        .resolve_conflicts(&[ConflictResolution::new("b.yaml", Resolution::KeepLocal)])
        .await
        .unwrap();
    let edit = &f.edits()[0];
    assert_eq!(edit.action, EditAction::Create);
    assert_eq!(edit.base_sha, None);
    assert!(f.snapshot("b.yaml").is_none());

    f.orch.stage_all().unwrap();
    f.orch.push(None).await.unwrap();
    assert_eq!(f.remote.file_at(&repo(), "main", "models/b.yaml").unwrap().0, "mine");
}

#[tokio::test]
async fn unknown_resolution_applies_nothing() {
    let f = fixture();
    f.orch.read_file("a.yaml").await.unwrap();
    f.orch.read_file("b.yaml").await.unwrap();
    f.orch.write_file("a.yaml", "mine a").unwrap();
    f.orch.write_file("b.yaml", "mine b").unwrap();
    f.remote
        .set_remote_file(&repo(), "main", "models/a.yaml", Some("theirs a"))
        .unwrap();
    f.remote
        .set_remote_file(&repo(), "main", "models/b.yaml", Some("theirs b"))
        .unwrap();
    f.orch.pull().await.unwrap();
    assert_eq!(f.orch.conflicts().await.len(), 2);

    let err = f
        .orch
        .resolve_conflicts(&[
            ConflictResolution::new("a.yaml", Resolution::UseRemote),
            ConflictResolution::new("zzz.yaml", Resolution::UseRemote),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::UnknownConflict(ref p) if p == "zzz.yaml"));
    assert_eq!(f.edits().len(), 2);
    assert_eq!(f.orch.conflicts().await.len(), 2);

    // Partial resolution keeps the workspace in conflict.
    let remaining = f
        .orch
        .resolve_conflicts(&[ConflictResolution::new("a.yaml", Resolution::UseRemote)])
        .await
        .unwrap();
    assert_eq!(remaining, 1);
    assert_eq!(f.orch.status(), SyncStatus::Conflict);
    assert_eq!(f.orch.conflicts().await[0].path, "b.yaml");
}

#[tokio::test]
async fn failed_pull_sets_error_status() {
    let f = fixture();
    f.remote.fail_next(
        RemoteOp::BranchHead,
        RemoteError::AuthFailure("bad credentials".to_string()),
    );

    let err = f.orch.pull().await.unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(f.orch.status(), SyncStatus::Error);
    assert!(f.orch.last_error().await.unwrap().contains("bad credentials"));

    f.orch.pull().await.unwrap();
    assert_eq!(f.orch.status(), SyncStatus::Idle);
}

// ── Connectivity and backpressure ───────────────────────────────

#[tokio::test]
async fn offline_blocks_network_cycles_but_not_writes() {
    let f = fixture();
    let mut status = f.orch.subscribe_status();
    f.orch.set_online(false).await;
    assert_eq!(*status.borrow_and_update(), SyncStatus::Offline);

    f.orch.write_file("c.yaml", "c").unwrap();
    f.orch.stage_all().unwrap();
    assert!(matches!(f.orch.pull().await, Err(SyncError::Offline)));
    assert!(matches!(f.orch.sync(None).await, Err(SyncError::Offline)));
    assert_eq!(f.edits().len(), 1);

    f.orch.set_online(true).await;
    assert_eq!(f.orch.status(), SyncStatus::Idle);
    assert!(matches!(f.orch.sync(None).await.unwrap(), SyncOutcome::Committed(_)));
}

#[tokio::test]
async fn exhausted_quota_rejects_sync_without_status_change() {
    let f = fixture();
    f.orch.write_file("c.yaml", "c").unwrap();
    f.orch.stage_all().unwrap();
    f.remote.set_rate_limit(Some(RateLimit {
        limit: 5000,
        remaining: 0,
        reset_at: Utc::now() + Duration::hours(1),
    }));

    let err = f.orch.sync(None).await.unwrap_err();
    assert!(matches!(err, SyncError::Remote(RemoteError::RateLimited { .. })));
    assert_eq!(f.orch.status(), SyncStatus::Idle);
    assert_eq!(f.orch.last_error().await, None);
    assert_eq!(f.edits().len(), 1);
}

// ── Events and bookkeeping ──────────────────────────────────────

#[tokio::test]
async fn events_follow_the_cycle() {
    let f = fixture();
    let mut events = f.orch.subscribe_events();

    f.orch.write_file("c.yaml", "c").unwrap();
    assert_eq!(
        events.recv().await.unwrap(),
        SyncEvent::EditsChanged {
            workspace_id: f.ws.id.clone(),
            pending: 1
        }
    );

    f.orch.stage_all().unwrap();
    f.orch.sync(Some("Add c")).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen.iter().all(|e| e.workspace_id() == &f.ws.id));
    assert!(seen.iter().any(|e| matches!(e, SyncEvent::Committed { files: 1, .. })));
    assert!(seen.contains(&SyncEvent::EditsChanged {
        workspace_id: f.ws.id.clone(),
        pending: 0
    }));
    assert_eq!(
        seen.last(),
        Some(&SyncEvent::StatusChanged {
            workspace_id: f.ws.id.clone(),
            status: SyncStatus::Idle
        })
    );
}

#[tokio::test]
async fn conflicts_are_announced() {
    let f = fixture();
    f.orch.read_file("a.yaml").await.unwrap();
    f.orch.write_file("a.yaml", "mine").unwrap();
    f.remote
        .set_remote_file(&repo(), "main", "models/a.yaml", Some("theirs"))
        .unwrap();
    let mut events = f.orch.subscribe_events();

    f.orch.pull().await.unwrap();
    let mut detected = None;
    while let Ok(event) = events.try_recv() {
        if let SyncEvent::ConflictsDetected { conflicts, .. } = event {
            detected = Some(conflicts);
        }
    }
    assert_eq!(detected.unwrap().len(), 1);
}

#[tokio::test]
async fn sync_records_time() {
    let f = fixture();
    assert!(f.orch.workspace().await.last_synced_at.is_none());

    assert_eq!(f.orch.sync(None).await.unwrap(), SyncOutcome::NothingToPush);

    let synced = f.orch.workspace().await.last_synced_at.unwrap();
    let stored = f.store.get_workspace(&f.ws.id).unwrap().unwrap();
    assert_eq!(stored.last_synced_at, Some(synced));
}

#[tokio::test]
async fn queue_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("queue.db");
    let remote = Arc::new(MemoryRemote::new());
    seed(&remote);
    let ws = Workspace::new(WorkspaceKey::new("acme", "schemas", "main", "models"), "main");

    {
        let store = Arc::new(QueueStore::open(&db).unwrap());
        store.save_workspace(&ws).unwrap();
        let orch = SyncOrchestrator::new(ws.clone(), store, Arc::clone(&remote), "msg");
        orch.read_file("a.yaml").await.unwrap();
        orch.write_file("a.yaml", "a: 2\n").unwrap();
        orch.stage_all().unwrap();
    }

    let store = Arc::new(QueueStore::open(&db).unwrap());
    let orch = SyncOrchestrator::new(ws, store, Arc::clone(&remote), "msg");
    let edits = orch.pending_edits().unwrap();
    assert_eq!(edits.len(), 1);
    assert!(edits[0].staged);

    orch.push(None).await.unwrap();
    assert_eq!(remote.file_at(&repo(), "main", "models/a.yaml").unwrap().0, "a: 2\n");
}

// ── End to end ──────────────────────────────────────────────────

#[tokio::test]
async fn create_sync_diverge_resolve_push() {
    let f = fixture();

    assert_eq!(
        f.orch.write_file("new.yaml", "v1").unwrap(),
        WriteOutcome::Queued(EditAction::Create)
    );
    assert_eq!(f.edits()[0].base_sha, None);
    f.orch.stage(&["new.yaml"]).unwrap();
    assert!(matches!(f.orch.sync(None).await.unwrap(), SyncOutcome::Committed(_)));

    let first_sha = remote_sha(&f.remote, "models/new.yaml");
    assert_eq!(f.snapshot("new.yaml").unwrap().sha, first_sha);
    assert!(f.edits().is_empty());

    // A concurrent writer changes the file without us pulling.
    f.remote
        .set_remote_file(&repo(), "main", "models/new.yaml", Some("theirs"))
        .unwrap();
    let their_sha = remote_sha(&f.remote, "models/new.yaml");

    assert_eq!(
        f.orch.write_file("new.yaml", "v2").unwrap(),
        WriteOutcome::Queued(EditAction::Update)
    );
    assert_eq!(f.edits()[0].base_sha, Some(first_sha));

    let SyncOutcome::Conflicts(conflicts) = f.orch.pull().await.unwrap() else {
        panic!("expected conflicts");
    };
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].path, "new.yaml");

    let remaining = f
        .orch
        .resolve_conflicts(&[ConflictResolution::new("new.yaml", Resolution::KeepLocal)])
        .await
        .unwrap();
    assert_eq!(remaining, 0);
    assert_eq!(f.edits()[0].base_sha, Some(their_sha));
    assert_eq!(f.orch.status(), SyncStatus::Idle);

    f.orch.stage_all().unwrap();
    assert!(matches!(f.orch.push(None).await.unwrap(), SyncOutcome::Committed(_)));
    assert_eq!(f.remote.file_at(&repo(), "main", "models/new.yaml").unwrap().0, "v2");
    assert!(f.edits().is_empty());
}
