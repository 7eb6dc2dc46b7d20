//! Conflict records and dispositions.

use serde::{Deserialize, Serialize};

/// Divergence between a pending edit's base and the current remote file.
///
/// Held in memory only, between the pull that detected it and its resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub path: String,
    /// Queued content, `None` for a queued deletion.
    pub local_content: Option<String>,
    /// Current remote content, `None` if the file was deleted remotely.
    pub remote_content: Option<String>,
    /// Current remote blob sha, `None` if the file was deleted remotely.
    pub remote_sha: Option<String>,
    /// The stale base the local edit was made against.
    pub local_sha: String,
}

/// How to settle one conflicting path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "content", rename_all = "kebab-case")]
pub enum Resolution {
    /// Drop the local edit; the remote version wins.
    UseRemote,
    /// Keep the local content, re-based onto the current remote sha.
    KeepLocal,
    /// Replace the local content with merged content and re-base it.
    Manual(String),
}

/// A resolution chosen for one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub path: String,
    pub resolution: Resolution,
}

impl ConflictResolution {
    pub fn new(path: impl Into<String>, resolution: Resolution) -> Self {
        Self {
            path: path.into(),
            resolution,
        }
    }
}
