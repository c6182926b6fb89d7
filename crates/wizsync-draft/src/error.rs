//! Local storage errors
//!
//! Never fatal: the draft layer logs these and carries on without a draft.
//! Only an explicit manual save reports them to the caller.

use std::path::PathBuf;

/// Failure reading or writing the local store
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Filesystem failure
    #[error("io error on {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Record could not be serialized
    #[error("failed to encode record '{key}': {source}")]
    Encode {
        /// Store key
        key: String,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// Stored bytes are not a valid record
    #[error("corrupt record '{key}': {source}")]
    Decode {
        /// Store key
        key: String,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// Store refused the operation (quota, disabled storage)
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if the stored record itself is unreadable
    #[inline]
    #[must_use]
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}
