//! GitHub remote implementation.
//!
//! Uses the GitHub REST API v3: the contents API for reads and the git data
//! API (trees, commits, refs) for atomic multi-file commits.

use crate::error::{RemoteError, RemoteResult};
use crate::repository::{
    check_unique_paths, CommitResult, FileChange, RateLimit, RemoteFile, RemoteRepository,
    RepoRef,
};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reposync_types::{EditAction, EntryKind, TreeEntry};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const API_VERSION: &str = "2022-11-28";
const FILE_MODE: &str = "100644";

/// GitHub specific configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// Base URL for the REST API (e.g. `https://api.github.com`).
    pub api_base_url: String,
    /// User agent sent with every request. GitHub rejects requests without one.
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Access token. Never persisted.
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.github.com".to_string(),
            user_agent: "reposync".to_string(),
            timeout_secs: 60,
            token: None,
        }
    }
}

impl fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("api_base_url", &self.api_base_url)
            .field("user_agent", &self.user_agent)
            .field("timeout_secs", &self.timeout_secs)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// GitHub API response structures.
#[derive(Debug, Deserialize)]
struct ContentResponse {
    path: String,
    sha: String,
    content: Option<String>,
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlobResponse {
    content: String,
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: ShaObject,
}

#[derive(Debug, Deserialize)]
struct ShaObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct CommitObject {
    tree: ShaObject,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    sha: String,
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    size: Option<u64>,
}

/// GitHub remote repository client.
pub struct GitHubClient {
    config: GitHubConfig,
    client: Client,
    rate_limit: Arc<RwLock<Option<RateLimit>>>,
}

impl GitHubClient {
    /// Creates a new GitHub client.
    pub fn new(config: GitHubConfig) -> RemoteResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| RemoteError::InvalidRequest(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            rate_limit: Arc::new(RwLock::new(None)),
        })
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &GitHubConfig {
        &self.config
    }

    fn repo_url(&self, repo: &RepoRef, tail: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.config.api_base_url,
            urlencoding::encode(&repo.owner),
            urlencoding::encode(&repo.repo),
            tail
        )
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Fails fast while the last reported quota is exhausted.
    async fn check_quota(&self) -> RemoteResult<()> {
        if let Some(limit) = *self.rate_limit.read().await {
            if limit.is_exhausted(Utc::now()) {
                debug!("Rejecting request: rate limit exhausted until {}", limit.reset_at);
                return Err(RemoteError::RateLimited {
                    reset_at: limit.reset_at,
                });
            }
        }
        Ok(())
    }

    /// Sends a request, records the quota headers and maps error statuses.
    async fn send(&self, request: RequestBuilder, what: &str) -> RemoteResult<Response> {
        self.check_quota().await?;

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Network(format!("{what} failed: {e}")))?;

        let quota = parse_rate_limit(response.headers());
        if let Some(quota) = quota {
            *self.rate_limit.write().await = Some(quota);
        }

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = parse_retry_after(response.headers());
        let message = response.text().await.unwrap_or_default();
        debug!("{} returned {}: {}", what, status, message);

        Err(match status.as_u16() {
            404 => RemoteError::NotFound(what.to_string()),
            401 => RemoteError::AuthFailure(message),
            403 | 429 if quota.is_some_and(|q| q.remaining == 0) => RemoteError::RateLimited {
                reset_at: quota.map(|q| q.reset_at).unwrap_or_else(Utc::now),
            },
            429 => RemoteError::RateLimited {
                reset_at: Utc::now() + retry_after.unwrap_or(ChronoDuration::seconds(60)),
            },
            403 if retry_after.is_some() => RemoteError::RateLimited {
                reset_at: Utc::now() + retry_after.unwrap_or(ChronoDuration::zero()),
            },
            403 => RemoteError::AuthFailure(message),
            code => RemoteError::Api {
                status: code,
                message,
            },
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String, what: &str) -> RemoteResult<T> {
        let response = self.send(self.request(Method::GET, url), what).await?;
        response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(format!("failed to parse {what}: {e}")))
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        body: &serde_json::Value,
        what: &str,
    ) -> RemoteResult<T> {
        let response = self
            .send(self.request(Method::POST, url).json(body), what)
            .await?;
        response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(format!("failed to parse {what}: {e}")))
    }

    async fn fetch_tree(&self, repo: &RepoRef, tree_ish: &str) -> RemoteResult<TreeResponse> {
        let url = self.repo_url(
            repo,
            &format!("/git/trees/{}?recursive=1", encode_path(tree_ish)),
        );
        let tree: TreeResponse = self.get_json(url, &format!("tree {tree_ish}")).await?;
        if tree.truncated {
            warn!("Tree listing of {} at {} was truncated", repo, tree_ish);
        }
        Ok(tree)
    }

    async fn read_blob(&self, repo: &RepoRef, sha: &str) -> RemoteResult<String> {
        let url = self.repo_url(repo, &format!("/git/blobs/{sha}"));
        let blob: BlobResponse = self.get_json(url, &format!("blob {sha}")).await?;
        if blob.encoding != "base64" {
            return Err(RemoteError::Decode(format!(
                "unsupported blob encoding: {}",
                blob.encoding
            )));
        }
        decode_base64(&blob.content)
    }
}

#[async_trait]
impl RemoteRepository for GitHubClient {
    fn provider_name(&self) -> &'static str {
        "GitHub"
    }

    async fn read_file(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> RemoteResult<RemoteFile> {
        debug!("Reading {} at {} from {}", path, git_ref, repo);

        let url = self.repo_url(repo, &format!("/contents/{}", encode_path(path)));
        let request = self.request(Method::GET, url).query(&[("ref", git_ref)]);
        let response = self.send(request, path).await?;
        let body: ContentResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(format!("{path} is not a file: {e}")))?;

        // Files over 1 MB come back without inline content.
        let content = match (body.encoding.as_deref(), body.content.as_deref()) {
            (Some("base64"), Some(encoded)) if !encoded.is_empty() => decode_base64(encoded)?,
            _ => self.read_blob(repo, &body.sha).await?,
        };

        Ok(RemoteFile {
            path: body.path,
            content,
            sha: body.sha,
        })
    }

    async fn branch_head(&self, repo: &RepoRef, branch: &str) -> RemoteResult<String> {
        let url = self.repo_url(repo, &format!("/git/ref/heads/{}", encode_path(branch)));
        let reference: RefResponse = self.get_json(url, &format!("branch {branch}")).await?;
        Ok(reference.object.sha)
    }

    async fn default_branch(&self, repo: &RepoRef) -> RemoteResult<String> {
        let url = self.repo_url(repo, "");
        let info: RepoResponse = self.get_json(url, &format!("repository {repo}")).await?;
        Ok(info.default_branch)
    }

    async fn list_tree(
        &self,
        repo: &RepoRef,
        git_ref: &str,
        prefix: &str,
    ) -> RemoteResult<Vec<TreeEntry>> {
        let tree = self.fetch_tree(repo, git_ref).await?;
        let prefix = prefix.trim_matches('/');

        Ok(tree
            .tree
            .into_iter()
            .filter(|item| under_prefix(&item.path, prefix))
            .filter_map(|item| {
                let kind = match item.kind.as_str() {
                    "blob" => EntryKind::Blob,
                    "tree" => EntryKind::Tree,
                    _ => return None,
                };
                Some(TreeEntry {
                    path: item.path,
                    sha: item.sha,
                    kind,
                    size: item.size,
                })
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

        let head = self.branch_head(repo, branch).await?;
        if head != parent_sha {
            return Err(RemoteError::RefMoved {
                branch: branch.to_string(),
                expected: parent_sha.to_string(),
                actual: Some(head),
            });
        }

        let parent: CommitObject = self
            .get_json(
                self.repo_url(repo, &format!("/git/commits/{parent_sha}")),
                &format!("commit {parent_sha}"),
            )
            .await?;

        let entries: Vec<serde_json::Value> = changes.iter().map(tree_entry).collect();
        let tree: ShaObject = self
            .post_json(
                self.repo_url(repo, "/git/trees"),
                &serde_json::json!({
                    "base_tree": parent.tree.sha,
                    "tree": entries,
                }),
                "tree creation",
            )
            .await?;

        let commit: ShaObject = self
            .post_json(
                self.repo_url(repo, "/git/commits"),
                &serde_json::json!({
                    "message": message,
                    "tree": tree.sha,
                    "parents": [parent_sha],
                }),
                "commit creation",
            )
            .await?;

        let update = self
            .request(
                Method::PATCH,
                self.repo_url(repo, &format!("/git/refs/heads/{}", encode_path(branch))),
            )
            .json(&serde_json::json!({ "sha": commit.sha, "force": false }));
        match self.send(update, &format!("branch {branch}")).await {
            Ok(_) => {}
            Err(RemoteError::Api { status: 409 | 422, message }) => {
                debug!("Ref update rejected: {}", message);
                return Err(RemoteError::RefMoved {
                    branch: branch.to_string(),
                    expected: parent_sha.to_string(),
                    actual: None,
                });
            }
            Err(e) => return Err(e),
        }

        info!(
            "Committed {} change(s) to {}@{}: {}",
            changes.len(),
            repo,
            branch,
            commit.sha
        );

        // The ref now points at the new commit; nothing after this may fail.
        let blob_shas: HashMap<String, String> = changes
            .iter()
            .filter(|c| c.action != EditAction::Delete)
            .filter_map(|c| Some((c.path.clone(), git_blob_sha(c.content.as_deref()?))))
            .collect();

        Ok(CommitResult {
            commit_sha: commit.sha,
            tree_sha: tree.sha,
            blob_shas,
        })
    }

    async fn rate_limit(&self) -> Option<RateLimit> {
        *self.rate_limit.read().await
    }
}

fn tree_entry(change: &FileChange) -> serde_json::Value {
    match &change.content {
        Some(content) if change.action != EditAction::Delete => serde_json::json!({
            "path": change.path,
            "mode": FILE_MODE,
            "type": "blob",
            "content": content,
        }),
        _ => serde_json::json!({
            "path": change.path,
            "mode": FILE_MODE,
            "type": "blob",
            "sha": serde_json::Value::Null,
        }),
    }
}

/// Object id git assigns to a blob: `sha1("blob <len>\0" + content)`.
pub fn git_blob_sha(content: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", content.len()).as_bytes());
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

fn under_prefix(path: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn encode_path(path: &str) -> String {
    path.trim_matches('/')
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn decode_base64(encoded: &str) -> RemoteResult<String> {
    let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(cleaned)
        .map_err(|e| RemoteError::Decode(format!("invalid base64 content: {e}")))?;
    String::from_utf8(bytes).map_err(|e| RemoteError::Decode(format!("content is not UTF-8: {e}")))
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn parse_rate_limit(headers: &HeaderMap) -> Option<RateLimit> {
    let remaining = header_u64(headers, "x-ratelimit-remaining")?;
    let reset = header_u64(headers, "x-ratelimit-reset")?;
    let limit = header_u64(headers, "x-ratelimit-limit").unwrap_or(0);
    Some(RateLimit {
        limit: limit as u32,
        remaining: remaining as u32,
        reset_at: DateTime::from_timestamp(reset as i64, 0)?,
    })
}

fn parse_retry_after(headers: &HeaderMap) -> Option<ChronoDuration> {
    header_u64(headers, "retry-after").map(|secs| ChronoDuration::seconds(secs as i64))
}
