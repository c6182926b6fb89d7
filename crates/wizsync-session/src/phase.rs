//! Client-side session lifecycle
//!
//! `Uninitialized -> Creating -> Active(step, rev) -> Active(step', rev+1)* -> Completed | Errored`
//!
//! `Active` is the only phase that accepts navigation and actions.

use serde::{Deserialize, Serialize};
use std::fmt;
use wizsync_model::{Revision, SessionId, StepId};

/// Phase discriminant, used for transition checks and error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseKind {
    /// No session attached
    Uninitialized,
    /// Creation request in flight
    Creating,
    /// Session accepts mutations
    Active,
    /// Session finished
    Completed,
    /// Session failed server-side
    Errored,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Creating => "creating",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Full client phase with the data each phase carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientPhase {
    /// No session attached
    Uninitialized,
    /// Creation request in flight
    Creating,
    /// Session accepts mutations
    Active {
        /// Attached session
        session_id: SessionId,
        /// Step the server reports
        step_id: StepId,
        /// Last accepted revision
        revision: Revision,
    },
    /// Session finished
    Completed {
        /// Finished session
        session_id: SessionId,
    },
    /// Session failed server-side
    Errored {
        /// Failed session
        session_id: SessionId,
        /// Failure description
        reason: String,
    },
}

impl ClientPhase {
    /// Discriminant
    #[must_use]
    pub fn kind(&self) -> PhaseKind {
        match self {
            Self::Uninitialized => PhaseKind::Uninitialized,
            Self::Creating => PhaseKind::Creating,
            Self::Active { .. } => PhaseKind::Active,
            Self::Completed { .. } => PhaseKind::Completed,
            Self::Errored { .. } => PhaseKind::Errored,
        }
    }

    /// Session attached in this phase, if any
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::Active { session_id, .. }
            | Self::Completed { session_id }
            | Self::Errored { session_id, .. } => Some(session_id),
            Self::Uninitialized | Self::Creating => None,
        }
    }
}

/// Phases reachable from `from`
#[must_use]
pub fn allowed_transitions(from: PhaseKind) -> Vec<PhaseKind> {
    use PhaseKind::{Active, Completed, Creating, Errored, Uninitialized};
    match from {
        Uninitialized => vec![Creating, Active, Completed, Errored],
        Creating => vec![Active, Completed, Errored, Uninitialized],
        Active => vec![Active, Completed, Errored, Creating, Uninitialized],
        Completed => vec![Creating, Active, Completed, Errored, Uninitialized],
        Errored => vec![Creating, Active, Completed, Errored, Uninitialized],
    }
}

/// Whether `from -> to` is a legal transition
#[must_use]
pub fn is_allowed(from: PhaseKind, to: PhaseKind) -> bool {
    allowed_transitions(from).contains(&to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creating_cannot_restart_creation() {
        assert!(!is_allowed(PhaseKind::Creating, PhaseKind::Creating));
        assert!(is_allowed(PhaseKind::Creating, PhaseKind::Active));
    }

    #[test]
    fn active_can_advance_and_finish() {
        assert!(is_allowed(PhaseKind::Active, PhaseKind::Active));
        assert!(is_allowed(PhaseKind::Active, PhaseKind::Completed));
        assert!(is_allowed(PhaseKind::Active, PhaseKind::Errored));
    }

    #[test]
    fn session_id_only_in_attached_phases() {
        assert!(ClientPhase::Uninitialized.session_id().is_none());
        assert!(ClientPhase::Creating.session_id().is_none());
        let phase = ClientPhase::Completed {
            session_id: SessionId::new("s"),
        };
        assert_eq!(phase.session_id().map(SessionId::as_str), Some("s"));
        assert_eq!(phase.kind(), PhaseKind::Completed);
    }
}
