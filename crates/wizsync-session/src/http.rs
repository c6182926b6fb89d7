//! HTTP implementation of the session RPC surface
//!
//! Routes (relative to the configured base URL):
//! - `POST   /wizard/sessions`
//! - `POST   /wizard/sessions/{id}/navigate`
//! - `POST   /wizard/sessions/{id}/steps/{step}/validate`
//! - `POST   /wizard/sessions/{id}/steps/{step}/actions/{action}`
//! - `POST   /wizard/sessions/{id}/steps/{step}/complete`
//! - `GET    /wizard/sessions/{id}`
//! - `GET    /wizard/sessions/{id}/result`
//!
//! A `409` carrying `{expectedRevision, actualRevision}` becomes
//! [`SessionError::RevisionConflict`]; a body listing `missingPrerequisites`
//! becomes [`SessionError::Prerequisite`].

use crate::error::{PrerequisiteFailure, SessionError};
use crate::transport::{ActionOutcome, CreateSessionRequest, SessionTransport, ValidationOutcome};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use wizsync_model::{ActionId, Revision, SessionId, StepId, WizardResult, WizardSession};

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// reqwest-backed [`SessionTransport`]
#[derive(Debug, Clone)]
pub struct HttpSessionTransport {
    client: Client,
    base_url: String,
}

impl HttpSessionTransport {
    /// Transport against `base_url` with the default timeout
    ///
    /// # Errors
    /// Returns [`SessionError::Transport`] if the HTTP client cannot be built
    pub fn new(base_url: impl Into<String>) -> Result<Self, SessionError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Transport against `base_url` with an explicit timeout
    ///
    /// # Errors
    /// Returns [`SessionError::Transport`] if the HTTP client cannot be built
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SessionError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Base URL without trailing slash
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn session_url(&self, session: &SessionId) -> String {
        format!("{}/wizard/sessions/{}", self.base_url, session)
    }

    fn step_url(&self, session: &SessionId, step: &StepId) -> String {
        format!("{}/steps/{}", self.session_url(session), step)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        step: Option<&StepId>,
    ) -> Result<T, SessionError> {
        let response = request
            .send()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| SessionError::Decode(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), "session request rejected");
        Err(decode_error(status, &body, step))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConflictBody {
    expected_revision: u64,
    actual_revision: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrerequisiteBody {
    missing_prerequisites: Vec<String>,
    #[serde(default)]
    suggestion: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    target_step_id: Option<StepId>,
}

/// Classify a non-success response
#[must_use]
pub fn decode_error(status: StatusCode, body: &str, step: Option<&StepId>) -> SessionError {
    if status == StatusCode::CONFLICT {
        if let Ok(conflict) = serde_json::from_str::<ConflictBody>(body) {
            return SessionError::RevisionConflict {
                expected: Revision(conflict.expected_revision),
                actual: Revision(conflict.actual_revision),
            };
        }
    }

    if status.is_client_error() {
        if let Ok(prereq) = serde_json::from_str::<PrerequisiteBody>(body) {
            let target = prereq
                .target_step_id
                .or_else(|| step.cloned())
                .unwrap_or_else(|| StepId::from(""));
            let suggestion = prereq
                .suggestion
                .or(prereq.message)
                .unwrap_or_else(|| "complete the previous steps first".to_string());
            return SessionError::Prerequisite(PrerequisiteFailure::new(
                target,
                suggestion,
                prereq.missing_prerequisites,
            ));
        }
    }

    let message = if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string()
    } else {
        body.to_string()
    };
    SessionError::Http {
        status: status.as_u16(),
        message,
    }
}

fn with_revision(mut body: Value, revision: Option<Revision>) -> Value {
    if let (Some(rev), Some(map)) = (revision, body.as_object_mut()) {
        map.insert("revision".to_string(), json!(rev.value()));
    }
    body
}

#[async_trait]
impl SessionTransport for HttpSessionTransport {
    async fn create(&self, request: &CreateSessionRequest) -> Result<WizardSession, SessionError> {
        let url = format!("{}/wizard/sessions", self.base_url);
        self.send(self.client.post(url).json(request), None)
            .await
            .map_err(|e| match e {
                SessionError::Create(_) => e,
                other => SessionError::Create(other.to_string()),
            })
    }

    async fn navigate(
        &self,
        session: &SessionId,
        target: &StepId,
        revision: Option<Revision>,
    ) -> Result<WizardSession, SessionError> {
        let url = format!("{}/navigate", self.session_url(session));
        let body = with_revision(json!({ "targetStepId": target }), revision);
        self.send(self.client.post(url).json(&body), Some(target))
            .await
            .map_err(|e| e.not_found_as(session))
    }

    async fn validate(
        &self,
        session: &SessionId,
        step: &StepId,
        input: &Value,
    ) -> Result<ValidationOutcome, SessionError> {
        let url = format!("{}/validate", self.step_url(session, step));
        self.send(self.client.post(url).json(&json!({ "input": input })), Some(step))
            .await
            .map_err(|e| e.not_found_as(session))
    }

    async fn execute_action(
        &self,
        session: &SessionId,
        step: &StepId,
        action: &ActionId,
        input: &Value,
        revision: Option<Revision>,
    ) -> Result<ActionOutcome, SessionError> {
        let url = format!("{}/actions/{}", self.step_url(session, step), action);
        let body = with_revision(json!({ "input": input }), revision);
        self.send(self.client.post(url).json(&body), Some(step))
            .await
            .map_err(|e| e.not_found_as(session))
    }

    async fn mark_step_completed(
        &self,
        session: &SessionId,
        step: &StepId,
        output: &Value,
        revision: Option<Revision>,
    ) -> Result<WizardSession, SessionError> {
        let url = format!("{}/complete", self.step_url(session, step));
        let body = with_revision(json!({ "output": output }), revision);
        self.send(self.client.post(url).json(&body), Some(step))
            .await
            .map_err(|e| e.not_found_as(session))
    }

    async fn get_state(&self, session: &SessionId) -> Result<WizardSession, SessionError> {
        self.send(self.client.get(self.session_url(session)), None)
            .await
            .map_err(|e| e.not_found_as(session))
    }

    async fn get_result(&self, session: &SessionId) -> Result<WizardResult, SessionError> {
        let url = format!("{}/result", self.session_url(session));
        self.send(self.client.get(url), None)
            .await
            .map_err(|e| e.not_found_as(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_body_becomes_revision_conflict() {
        let err = decode_error(
            StatusCode::CONFLICT,
            r#"{"expectedRevision":3,"actualRevision":5}"#,
            None,
        );
        assert!(matches!(
            err,
            SessionError::RevisionConflict {
                expected: Revision(3),
                actual: Revision(5)
            }
        ));
    }

    #[test]
    fn conflict_without_body_stays_http() {
        let err = decode_error(StatusCode::CONFLICT, "", None);
        assert!(matches!(err, SessionError::Http { status: 409, .. }));
    }

    #[test]
    fn prerequisite_body_uses_request_step_as_fallback() {
        let err = decode_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"missingPrerequisites":["queryId"],"message":"Maak eerst een query aan"}"#,
            Some(&StepId::from("website-selection")),
        );
        let failure = err.prerequisite().cloned().unwrap();
        assert_eq!(failure.step, StepId::from("website-selection"));
        assert_eq!(failure.missing, vec!["queryId"]);
        assert_eq!(failure.suggestion, "Maak eerst een query aan");
    }

    #[test]
    fn server_error_keeps_status_and_reason() {
        let err = decode_error(StatusCode::BAD_GATEWAY, "  ", None);
        match err {
            SessionError::Http { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn revision_is_added_only_when_present() {
        assert_eq!(
            with_revision(json!({"input": 1}), Some(Revision(4))),
            json!({"input": 1, "revision": 4})
        );
        assert_eq!(with_revision(json!({"input": 1}), None), json!({"input": 1}));
    }

    #[test]
    fn base_url_is_normalized() {
        let transport = HttpSessionTransport::new("http://localhost:4000/api/").unwrap();
        assert_eq!(transport.base_url(), "http://localhost:4000/api");
        assert_eq!(
            transport.step_url(&SessionId::new("s1"), &StepId::from("document-review")),
            "http://localhost:4000/api/wizard/sessions/s1/steps/document-review"
        );
    }
}
