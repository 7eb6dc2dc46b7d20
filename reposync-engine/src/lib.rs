//! Local-first sync engine for reposync.
//!
//! Edits to files of a hosted repository are queued durably and committed
//! back as one atomic commit per push. Divergence from the remote is detected
//! on pull and surfaced as conflicts for a human to resolve.
//!
//! # Components
//!
//! - [`SyncOrchestrator`]: per-workspace state machine driving pull, push and
//!   sync, owning the status and conflict list.
//! - [`ConflictResolver`]: applies `use-remote`, `keep-local` or `manual`
//!   dispositions to conflicting paths.
//! - [`WorkspaceManager`]: opens, restores, switches and closes workspaces.
//!
//! # Example
//!
//! ```no_run
//! use reposync_engine::{EngineConfig, WorkspaceManager};
//! use reposync_remote::{GitHubClient, GitHubConfig};
//! use reposync_store::QueueStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::default();
//! let store = Arc::new(QueueStore::open(&config.database_path)?);
//! let remote = Arc::new(GitHubClient::new(GitHubConfig::default())?);
//! let manager = WorkspaceManager::new(store, remote, config);
//!
//! let ws = manager.open_workspace("acme", "schemas", None, "models").await?;
//! ws.write_file("a.yaml", "name: a\n")?;
//! ws.stage_all()?;
//! ws.sync(Some("Add a.yaml")).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod events;
mod manager;
mod orchestrator;
mod resolver;

pub use config::EngineConfig;
pub use error::{SyncError, SyncResult};
pub use events::{SyncEvent, EVENT_CHANNEL_CAPACITY};
pub use manager::WorkspaceManager;
pub use orchestrator::{normalize_path, CommitSummary, SyncOutcome, SyncOrchestrator, WriteOutcome};
pub use resolver::{ConflictResolver, Disposition};
