use std::path::PathBuf;

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by store mutators.
///
/// Load problems never surface here: an unreadable document is quarantined and
/// replaced with defaults instead.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("'{0}' is not a group id")]
    InvalidGroupId(String),
    #[error("store i/o failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("failed to persist store file {path}: {reason}")]
    Persist { path: PathBuf, reason: String },
}

impl StoreError {
    pub(crate) fn persist(path: &std::path::Path, error: impl std::fmt::Display) -> Self {
        Self::Persist {
            path: path.to_path_buf(),
            reason: format!("{error:#}"),
        }
    }
}
