//! Session RPC surface
//!
//! [`SessionTransport`] is the seam between the client and whatever serves
//! wizard sessions. Mutating calls accept an optional revision; a stale one
//! must come back as [`SessionError::RevisionConflict`].

use crate::error::SessionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use wizsync_model::{ActionId, Revision, SessionId, StepId, WizardResult, WizardSession};

/// Body of a session creation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Wizard definition to instantiate
    pub wizard_definition_id: String,
    /// Pinned definition version; latest when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wizard_definition_version: Option<u32>,
}

/// Server verdict on step input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    /// Whether the input is acceptable
    pub valid: bool,
    /// Field-level messages
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Response to an executed action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    /// Action-specific output
    #[serde(default)]
    pub output: Value,
    /// Session after the action, with its new revision
    pub session: WizardSession,
}

/// Wizard session RPC surface
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Allocate a new session
    async fn create(&self, request: &CreateSessionRequest) -> Result<WizardSession, SessionError>;

    /// Move the session to `target`
    async fn navigate(
        &self,
        session: &SessionId,
        target: &StepId,
        revision: Option<Revision>,
    ) -> Result<WizardSession, SessionError>;

    /// Validate step input without side effects
    async fn validate(
        &self,
        session: &SessionId,
        step: &StepId,
        input: &Value,
    ) -> Result<ValidationOutcome, SessionError>;

    /// Run a business action on a step
    async fn execute_action(
        &self,
        session: &SessionId,
        step: &StepId,
        action: &ActionId,
        input: &Value,
        revision: Option<Revision>,
    ) -> Result<ActionOutcome, SessionError>;

    /// Commit a step's output
    async fn mark_step_completed(
        &self,
        session: &SessionId,
        step: &StepId,
        output: &Value,
        revision: Option<Revision>,
    ) -> Result<WizardSession, SessionError>;

    /// Current session state
    async fn get_state(&self, session: &SessionId) -> Result<WizardSession, SessionError>;

    /// Result of a completed session
    async fn get_result(&self, session: &SessionId) -> Result<WizardResult, SessionError>;
}

#[async_trait]
impl<T: SessionTransport + ?Sized> SessionTransport for Arc<T> {
    async fn create(&self, request: &CreateSessionRequest) -> Result<WizardSession, SessionError> {
        (**self).create(request).await
    }

    async fn navigate(
        &self,
        session: &SessionId,
        target: &StepId,
        revision: Option<Revision>,
    ) -> Result<WizardSession, SessionError> {
        (**self).navigate(session, target, revision).await
    }

    async fn validate(
        &self,
        session: &SessionId,
        step: &StepId,
        input: &Value,
    ) -> Result<ValidationOutcome, SessionError> {
        (**self).validate(session, step, input).await
    }

    async fn execute_action(
        &self,
        session: &SessionId,
        step: &StepId,
        action: &ActionId,
        input: &Value,
        revision: Option<Revision>,
    ) -> Result<ActionOutcome, SessionError> {
        (**self)
            .execute_action(session, step, action, input, revision)
            .await
    }

    async fn mark_step_completed(
        &self,
        session: &SessionId,
        step: &StepId,
        output: &Value,
        revision: Option<Revision>,
    ) -> Result<WizardSession, SessionError> {
        (**self)
            .mark_step_completed(session, step, output, revision)
            .await
    }

    async fn get_state(&self, session: &SessionId) -> Result<WizardSession, SessionError> {
        (**self).get_state(session).await
    }

    async fn get_result(&self, session: &SessionId) -> Result<WizardResult, SessionError> {
        (**self).get_result(session).await
    }
}
