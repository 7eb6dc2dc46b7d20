//! Remote content client for reposync.
//!
//! Wraps a hosted repository's read APIs (file and tree fetch, branch
//! metadata) and its object-graph write APIs (blob/tree/commit creation,
//! reference update) behind one trait with a single write primitive:
//! atomically replace N files in a new commit, conditioned on the branch
//! still pointing at a known parent.
//!
//! # Implementations
//!
//! - [`GitHubClient`]: GitHub REST API over `reqwest`, tracking rate-limit
//!   headers as backpressure.
//! - [`MemoryRemote`]: in-process repository with fault injection, for
//!   tests and offline demos.

mod error;
pub mod github;
pub mod memory;
mod repository;

pub use error::{RemoteError, RemoteResult};
pub use github::{git_blob_sha, GitHubClient, GitHubConfig};
pub use memory::{MemoryRemote, RemoteOp};
pub use repository::{
    CommitResult, FileChange, RateLimit, RemoteFile, RemoteRepository, RepoRef,
};
