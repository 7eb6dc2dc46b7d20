//! Identifier types.
//!
//! Workspace ids are derived from the `(owner, repo, branch, path)` tuple so
//! the same location always maps to the same id across restarts. Edit ids use
//! UUID v7 for natural time ordering.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Length in hex characters of a workspace id.
const WORKSPACE_ID_LEN: usize = 32;

/// Stable identifier of a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    /// Derives the id for a repository location.
    ///
    /// Leading and trailing slashes of `path` are ignored, so `"docs/"` and
    /// `"/docs"` name the same workspace.
    #[must_use]
    pub fn derive(owner: &str, repo: &str, branch: &str, path: &str) -> Self {
        let path = path.trim_matches('/');
        let mut hasher = Sha256::new();
        hasher.update(format!("{owner}/{repo}@{branch}:{path}").as_bytes());
        let digest = hex::encode(hasher.finalize());
        Self(digest[..WORKSPACE_ID_LEN].to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses a workspace id, checking its shape.
    pub fn parse(s: &str) -> Result<Self, Error> {
        if s.len() == WORKSPACE_ID_LEN && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Err(Error::InvalidWorkspaceId(s.to_string()))
        }
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WorkspaceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Unique identifier for a pending edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EditId(Uuid);

impl EditId {
    /// Creates a new edit ID with the current timestamp.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates an edit ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parses an edit ID from a string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for EditId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EditId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EditId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}
