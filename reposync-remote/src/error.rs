//! Error types for the remote content client.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Typed failures of the remote repository.
///
/// The client never retries; callers decide based on `is_retryable`.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// The path, ref or repository does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The branch advanced past the expected parent commit.
    #[error("branch {branch} moved: expected {expected}, found {}", .actual.as_deref().unwrap_or("unknown"))]
    RefMoved {
        branch: String,
        expected: String,
        actual: Option<String>,
    },

    /// Request quota exhausted until `reset_at`.
    #[error("rate limited until {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    /// Credentials missing, expired or insufficient.
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// Unexpected API response.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The request was rejected locally before being sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Returns true for failures a caller may retry later without changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::RefMoved { .. }
                | RemoteError::RateLimited { .. }
                | RemoteError::Network(_)
        ) || matches!(self, RemoteError::Api { status, .. } if *status >= 500)
    }

    /// Returns true if this error represents a rate-limit response.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RemoteError::RateLimited { .. })
    }

    /// Returns how long to wait before the quota resets, if rate limited.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RemoteError::RateLimited { reset_at } => {
                Some((*reset_at - Utc::now()).to_std().unwrap_or_default())
            }
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RemoteError::Decode(e.to_string())
        } else {
            RemoteError::Network(e.to_string())
        }
    }
}
