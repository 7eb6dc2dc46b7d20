//! Remote file tree listing.

use serde::{Deserialize, Serialize};

/// Kind of object a tree entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
    Tree,
}

/// One entry of a recursive tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Repository path of the entry.
    pub path: String,
    pub sha: String,
    pub kind: EntryKind,
    /// Size in bytes; `None` for trees.
    pub size: Option<u64>,
}
