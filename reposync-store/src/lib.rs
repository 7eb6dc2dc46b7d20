//! Durable queue store for reposync.
//!
//! Persists the four record families the sync engine works with:
//! - pending edits, one per `(workspace, path)`
//! - last-known-remote file snapshots (the cache)
//! - open workspace descriptors
//! - a bounded recency list of workspaces
//!
//! The store has no network awareness. Every write is a single statement or
//! a single SQLite transaction, so a record is never partially applied.

mod error;
mod queue_store;

pub use error::{StoreError, StoreResult};
pub use queue_store::{CommitApplied, CommittedFile, QueueStore, DEFAULT_RECENT_LIMIT};
