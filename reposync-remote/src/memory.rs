//! In-memory remote implementation.
//!
//! Models just enough of a git host to exercise the sync engine: branches
//! pointing at commits, commits holding a full path → blob map, and the same
//! non-forced branch update rule as a real host. Failures can be injected per
//! operation, and connectivity and quota can be toggled.

use crate::error::{RemoteError, RemoteResult};
use crate::repository::{
    check_unique_paths, CommitResult, FileChange, RateLimit, RemoteFile, RemoteRepository,
    RepoRef,
};
use async_trait::async_trait;
use chrono::Utc;
use reposync_types::{EditAction, EntryKind, TreeEntry};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Operations failures can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    ReadFile,
    BranchHead,
    DefaultBranch,
    ListTree,
    CommitFiles,
}

#[derive(Debug, Clone)]
struct Blob {
    content: String,
    sha: String,
}

#[derive(Debug, Clone, Default)]
struct Commit {
    files: BTreeMap<String, Blob>,
}

#[derive(Debug, Default)]
struct Repo {
    default_branch: String,
    branches: HashMap<String, String>,
    commits: HashMap<String, Commit>,
}

impl Repo {
    fn commit_at(&self, git_ref: &str) -> Option<&Commit> {
        let sha = self.branches.get(git_ref).map(String::as_str).unwrap_or(git_ref);
        self.commits.get(sha)
    }
}

/// In-process remote repository.
#[derive(Default)]
pub struct MemoryRemote {
    repos: Mutex<HashMap<RepoRef, Repo>>,
    failures: Mutex<HashMap<RemoteOp, RemoteError>>,
    rate_limit: Mutex<Option<RateLimit>>,
    offline: AtomicBool,
    sequence: AtomicU64,
    commits_created: AtomicU64,
}

impl MemoryRemote {
    /// Creates an empty remote.
    pub fn new() -> Self {
        Self::default()
    }

    fn repos(&self) -> MutexGuard<'_, HashMap<RepoRef, Repo>> {
        self.repos.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a repository whose default branch holds `files`.
    /// Returns the initial commit sha.
    pub fn create_repo(&self, repo: &RepoRef, default_branch: &str, files: &[(&str, &str)]) -> String {
        let commit = Commit {
            files: files
                .iter()
                .map(|(path, content)| (path.to_string(), blob(content)))
                .collect(),
        };
        let sha = self.next_commit_sha();
        let mut repos = self.repos();
        let entry = repos.entry(repo.clone()).or_default();
        entry.default_branch = default_branch.to_string();
        entry.commits.insert(sha.clone(), commit);
        entry.branches.insert(default_branch.to_string(), sha.clone());
        sha
    }

    /// Creates `branch` pointing at the head of `from`.
    pub fn create_branch(&self, repo: &RepoRef, branch: &str, from: &str) -> Option<String> {
        let mut repos = self.repos();
        let entry = repos.get_mut(repo)?;
        let head = entry.branches.get(from)?.clone();
        entry.branches.insert(branch.to_string(), head.clone());
        Some(head)
    }

    /// Simulates a concurrent writer: commits a change to one path on top of
    /// the branch head. `None` deletes the path. Returns the new commit sha.
    pub fn set_remote_file(
        &self,
        repo: &RepoRef,
        branch: &str,
        path: &str,
        content: Option<&str>,
    ) -> Option<String> {
        let sha = self.next_commit_sha();
        let mut repos = self.repos();
        let entry = repos.get_mut(repo)?;
        let head = entry.branches.get(branch)?.clone();
        let mut commit = entry.commits.get(&head)?.clone();
        match content {
            Some(content) => {
                commit.files.insert(path.to_string(), blob(content));
            }
            None => {
                commit.files.remove(path);
            }
        }
        entry.commits.insert(sha.clone(), commit);
        entry.branches.insert(branch.to_string(), sha.clone());
        Some(sha)
    }

    /// Returns the commit a branch points at.
    pub fn head(&self, repo: &RepoRef, branch: &str) -> Option<String> {
        self.repos().get(repo)?.branches.get(branch).cloned()
    }

    /// Returns a file's content and blob sha at a branch head.
    pub fn file_at(&self, repo: &RepoRef, branch: &str, path: &str) -> Option<(String, String)> {
        let repos = self.repos();
        let file = repos.get(repo)?.commit_at(branch)?.files.get(path)?;
        Some((file.content.clone(), file.sha.clone()))
    }

    /// Makes the next call of `op` fail with `error`. Nothing is applied.
    pub fn fail_next(&self, op: RemoteOp, error: RemoteError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(op, error);
    }

    /// Toggles connectivity. While offline every call fails with `Network`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Sets the reported quota. An exhausted quota rejects every call.
    pub fn set_rate_limit(&self, limit: Option<RateLimit>) {
        *self.rate_limit.lock().unwrap_or_else(PoisonError::into_inner) = limit;
    }

    /// Number of commits landed through `commit_files`.
    pub fn commits_created(&self) -> u64 {
        self.commits_created.load(Ordering::SeqCst)
    }

    fn next_commit_sha(&self) -> String {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst);
        hash(format!("commit\0{n}").as_bytes())
    }

    fn enter(&self, op: RemoteOp) -> RemoteResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Network("remote unreachable".to_string()));
        }
        let limit = *self.rate_limit.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(limit) = limit {
            if limit.is_exhausted(Utc::now()) {
                return Err(RemoteError::RateLimited {
                    reset_at: limit.reset_at,
                });
            }
        }
        let injected = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&op);
        match injected {
            Some(error) => {
                debug!("Injected failure for {:?}: {}", op, error);
                Err(error)
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteRepository for MemoryRemote {
    fn provider_name(&self) -> &'static str {
        "Memory"
    }

    async fn read_file(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> RemoteResult<RemoteFile> {
        self.enter(RemoteOp::ReadFile)?;
        let repos = self.repos();
        let blob = repos
            .get(repo)
            .and_then(|r| r.commit_at(git_ref))
            .and_then(|c| c.files.get(path))
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))?;
        Ok(RemoteFile {
            path: path.to_string(),
            content: blob.content.clone(),
            sha: blob.sha.clone(),
        })
    }

    async fn branch_head(&self, repo: &RepoRef, branch: &str) -> RemoteResult<String> {
        self.enter(RemoteOp::BranchHead)?;
        self.head(repo, branch)
            .ok_or_else(|| RemoteError::NotFound(format!("branch {branch}")))
    }

    async fn default_branch(&self, repo: &RepoRef) -> RemoteResult<String> {
        self.enter(RemoteOp::DefaultBranch)?;
        self.repos()
            .get(repo)
            .map(|r| r.default_branch.clone())
            .ok_or_else(|| RemoteError::NotFound(format!("repository {repo}")))
    }

    async fn list_tree(
        &self,
        repo: &RepoRef,
        git_ref: &str,
        prefix: &str,
    ) -> RemoteResult<Vec<TreeEntry>> {
        self.enter(RemoteOp::ListTree)?;
        let repos = self.repos();
        let commit = repos
            .get(repo)
            .and_then(|r| r.commit_at(git_ref))
            .ok_or_else(|| RemoteError::NotFound(format!("tree {git_ref}")))?;
        let prefix = prefix.trim_matches('/');

        Ok(commit
            .files
            .iter()
            .filter(|(path, _)| {
                prefix.is_empty()
                    || path
                        .strip_prefix(prefix)
                        .is_some_and(|rest| rest.starts_with('/'))
            })
            .map(|(path, blob)| TreeEntry {
                path: path.clone(),
                sha: blob.sha.clone(),
                kind: EntryKind::Blob,
                size: Some(blob.content.len() as u64),
            })
            .collect())
    }

    async fn commit_files(
        &self,
        repo: &RepoRef,
        branch: &str,
        parent_sha: &str,
        changes: &[FileChange],
        message: &str,
    ) -> RemoteResult<CommitResult> {
        check_unique_paths(changes)?;
        self.enter(RemoteOp::CommitFiles)?;

        let sha = self.next_commit_sha();
        let mut repos = self.repos();
        let entry = repos
            .get_mut(repo)
            .ok_or_else(|| RemoteError::NotFound(format!("repository {repo}")))?;

        let head = entry
            .branches
            .get(branch)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("branch {branch}")))?;
        if head != parent_sha {
            return Err(RemoteError::RefMoved {
                branch: branch.to_string(),
                expected: parent_sha.to_string(),
                actual: Some(head),
            });
        }

        let mut commit = entry
            .commits
            .get(parent_sha)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("commit {parent_sha}")))?;
        let mut blob_shas = HashMap::new();
        for change in changes {
            match (&change.action, &change.content) {
                (EditAction::Delete, _) | (_, None) => {
                    if commit.files.remove(&change.path).is_none() {
                        return Err(RemoteError::Api {
                            status: 422,
                            message: format!("cannot delete missing path {}", change.path),
                        });
                    }
                }
                (_, Some(content)) => {
                    let b = blob(content);
                    blob_shas.insert(change.path.clone(), b.sha.clone());
                    commit.files.insert(change.path.clone(), b);
                }
            }
        }

        let tree_sha = hash(
            commit
                .files
                .iter()
                .map(|(p, b)| format!("{p}\0{}", b.sha))
                .collect::<Vec<_>>()
                .join("\n")
                .as_bytes(),
        );
        entry.commits.insert(sha.clone(), commit);
        entry.branches.insert(branch.to_string(), sha.clone());
        self.commits_created.fetch_add(1, Ordering::SeqCst);
        debug!("Memory commit {} on {}@{}: {}", sha, repo, branch, message);

        Ok(CommitResult {
            commit_sha: sha,
            tree_sha,
            blob_shas,
        })
    }

    async fn rate_limit(&self) -> Option<RateLimit> {
        *self.rate_limit.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn blob(content: &str) -> Blob {
    Blob {
        content: content.to_string(),
        sha: hash(format!("blob\0{content}").as_bytes()),
    }
}

fn hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
