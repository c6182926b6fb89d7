//! Errors for guarded loads

/// Failure of a guarded asynchronous load
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// Response had the wrong shape
    #[error("unexpected {resource} response: expected {expected}, got {actual}")]
    DataFormat {
        /// What was being loaded
        resource: &'static str,
        /// Shape the caller requires
        expected: &'static str,
        /// Shape that arrived
        actual: String,
    },

    /// The source could not deliver
    #[error("source failed: {0}")]
    Source(String),

    /// Polling gave up without a final status
    #[error("no final status after {polls} polls")]
    PollLimitReached {
        /// Polls made
        polls: u32,
    },

    /// The scan itself ended in failure
    #[error("scan failed: {0}")]
    ScanFailed(String),
}

impl LoadError {
    /// Create a source error
    pub fn source_failed(message: impl Into<String>) -> Self {
        Self::Source(message.into())
    }

    /// Check if a user-triggered retry may help
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Source(_) | Self::PollLimitReached { .. })
    }
}
