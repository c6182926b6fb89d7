//! Server-owned wizard session record

use crate::context::SessionContext;
use crate::ids::{SessionId, StepId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Optimistic-concurrency revision of a wizard session
///
/// Incremented by the server for every accepted mutation. A mutation that
/// presents a revision other than the current one is rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(pub u64);

impl Revision {
    /// Revision of a freshly created session
    pub const INITIAL: Self = Self(0);

    /// The revision following this one
    #[inline]
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Raw value
    #[inline]
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Lifecycle status of a server session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Accepting navigation and actions
    Active,
    /// Finished; the result can be retrieved
    Completed,
    /// Terminated by a server-side failure
    Error,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Server-authoritative wizard session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardSession {
    /// Opaque session identifier
    pub session_id: SessionId,
    /// Wizard definition this session runs
    pub wizard_definition_id: String,
    /// Version of the wizard definition
    pub wizard_definition_version: u32,
    /// Step the session currently sits on
    pub current_step_id: StepId,
    /// Concurrency revision
    pub revision: Revision,
    /// Lifecycle status
    pub status: SessionStatus,
    /// Accumulated step outputs
    #[serde(default)]
    pub context: SessionContext,
    /// Last server-side modification
    pub updated_at: DateTime<Utc>,
}

impl WizardSession {
    /// Whether the session still accepts mutations
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Whether the session has finished
    #[inline]
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }
}

/// Final output of a completed wizard session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardResult {
    /// Session the result belongs to
    pub session_id: SessionId,
    /// Result payload as produced by the wizard definition
    #[serde(default)]
    pub summary: serde_json::Value,
    /// Completion time
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_next_is_strictly_greater() {
        let r = Revision(7);
        assert!(r.next() > r);
        assert_eq!(r.next().value(), 8);
    }

    #[test]
    fn session_deserializes_camel_case_payload() {
        let raw = r#"{
            "sessionId": "s-1",
            "wizardDefinitionId": "beleidsscan-wizard",
            "wizardDefinitionVersion": 1,
            "currentStepId": "query-configuration",
            "revision": 3,
            "status": "active",
            "context": {"onderwerp": "fietsparkeren"},
            "updatedAt": "2026-01-05T10:00:00Z"
        }"#;

        let session: WizardSession = serde_json::from_str(raw).unwrap();
        assert_eq!(session.revision, Revision(3));
        assert!(session.is_active());
        assert_eq!(session.context.onderwerp(), Some("fietsparkeren"));
    }

    #[test]
    fn missing_context_defaults_to_empty() {
        let raw = r#"{
            "sessionId": "s-1",
            "wizardDefinitionId": "beleidsscan-wizard",
            "wizardDefinitionVersion": 1,
            "currentStepId": "query-configuration",
            "revision": 0,
            "status": "completed",
            "updatedAt": "2026-01-05T10:00:00Z"
        }"#;

        let session: WizardSession = serde_json::from_str(raw).unwrap();
        assert!(session.context.is_empty());
        assert!(session.is_completed());
    }
}
