//! Error types for the session client
//!
//! Covers the session-side failure taxonomy:
//! - Session creation failures
//! - Calls made from a phase that does not allow them
//! - Navigation blocked by missing prerequisites
//! - Optimistic-concurrency revision conflicts
//! - Transport and decoding failures

use crate::phase::PhaseKind;
use serde::{Deserialize, Serialize};
use wizsync_model::{Revision, SessionId, SessionStatus, StepId};

/// Main session error type
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// The server could not allocate a session
    #[error("session creation failed: {0}")]
    Create(String),

    /// Operation attempted from a phase that forbids it
    #[error("{operation} not allowed while session client is {phase}")]
    InvalidState {
        /// Rejected operation
        operation: &'static str,
        /// Phase the client was in
        phase: PhaseKind,
    },

    /// Navigation blocked by incomplete context
    #[error("prerequisites not met for {}: {}", .0.step, .0.suggestion)]
    Prerequisite(PrerequisiteFailure),

    /// Mutation presented a stale revision
    #[error("revision conflict: presented {expected}, server at {actual}")]
    RevisionConflict {
        /// Revision the client presented
        expected: Revision,
        /// Revision the server holds
        actual: Revision,
    },

    /// Session id unknown to the server
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// Result requested before completion
    #[error("result unavailable while session is {0}")]
    ResultUnavailable(SessionStatus),

    /// Server unreachable or connection dropped
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success status without a recognised body
    #[error("unexpected response ({status}): {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Response body did not match the expected shape
    #[error("malformed response: {0}")]
    Decode(String),
}

impl SessionError {
    /// Check if error is a revision conflict
    #[inline]
    #[must_use]
    pub fn is_revision_conflict(&self) -> bool {
        matches!(self, Self::RevisionConflict { .. })
    }

    /// Check if error is a prerequisite failure
    #[inline]
    #[must_use]
    pub fn is_prerequisite(&self) -> bool {
        matches!(self, Self::Prerequisite(_))
    }

    /// Check if the server could not be reached at all
    #[inline]
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Prerequisite details, if this is a prerequisite failure
    #[must_use]
    pub fn prerequisite(&self) -> Option<&PrerequisiteFailure> {
        match self {
            Self::Prerequisite(failure) => Some(failure),
            _ => None,
        }
    }

    /// Map a bare 404 onto [`SessionError::NotFound`] for `session`
    #[must_use]
    pub fn not_found_as(self, session: &SessionId) -> Self {
        match self {
            Self::Http { status: 404, .. } => Self::NotFound(session.clone()),
            other => other,
        }
    }
}

/// Details of a navigation blocked by missing prerequisites
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrerequisiteFailure {
    /// Step the navigation targeted
    pub step: StepId,
    /// Human-readable hint on how to proceed
    pub suggestion: String,
    /// Names of the unmet prerequisites
    pub missing: Vec<String>,
}

impl PrerequisiteFailure {
    /// Create a failure for `step`
    #[must_use]
    pub fn new(step: StepId, suggestion: impl Into<String>, missing: Vec<String>) -> Self {
        Self {
            step,
            suggestion: suggestion.into(),
            missing,
        }
    }
}
