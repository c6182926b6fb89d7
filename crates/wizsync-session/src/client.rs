//! Server-authoritative wizard session client

use crate::error::SessionError;
use crate::phase::{is_allowed, ClientPhase, PhaseKind};
use crate::retrier::RevisionConflictRetrier;
use crate::transport::{CreateSessionRequest, SessionTransport};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use wizsync_model::{
    ActionId, Revision, SessionId, SessionStatus, StepId, WizardResult, WizardSession,
};

#[derive(Debug)]
struct ClientState {
    phase: ClientPhase,
    session: Option<WizardSession>,
}

/// Owns one server-held wizard session
///
/// Every mutation goes through the [`RevisionConflictRetrier`]. The local
/// snapshot only moves forward: responses carrying an older revision of the
/// attached session are ignored.
pub struct WizardSessionClient {
    transport: Arc<dyn SessionTransport>,
    retrier: RevisionConflictRetrier,
    state: RwLock<ClientState>,
    creating: AtomicBool,
}

impl std::fmt::Debug for WizardSessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WizardSessionClient")
            .field("state", &*self.state.read())
            .field("retrier", &self.retrier)
            .finish_non_exhaustive()
    }
}

/// Restores the pre-creation phase unless creation committed
struct CreationGuard<'a> {
    client: &'a WizardSessionClient,
    previous: Option<ClientPhase>,
}

impl CreationGuard<'_> {
    fn commit(mut self) {
        self.previous = None;
    }
}

impl Drop for CreationGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            let mut state = self.client.state.write();
            if state.phase.kind() == PhaseKind::Creating {
                state.phase = previous;
            }
        }
        self.client.creating.store(false, Ordering::SeqCst);
    }
}

impl WizardSessionClient {
    /// Client over `transport` with the default retry bound
    #[must_use]
    pub fn new(transport: Arc<dyn SessionTransport>) -> Self {
        Self {
            transport,
            retrier: RevisionConflictRetrier::default(),
            state: RwLock::new(ClientState {
                phase: ClientPhase::Uninitialized,
                session: None,
            }),
            creating: AtomicBool::new(false),
        }
    }

    /// Replace the retrier (e.g. a different attempt cap)
    #[must_use]
    pub fn with_retrier(mut self, retrier: RevisionConflictRetrier) -> Self {
        self.retrier = retrier;
        self
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> ClientPhase {
        self.state.read().phase.clone()
    }

    /// Last accepted server snapshot
    #[must_use]
    pub fn session(&self) -> Option<WizardSession> {
        self.state.read().session.clone()
    }

    /// Attached session id
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.state.read().phase.session_id().cloned()
    }

    /// Revision of the last accepted snapshot
    #[must_use]
    pub fn revision(&self) -> Option<Revision> {
        self.state.read().session.as_ref().map(|s| s.revision)
    }

    /// Whether a creation request is in flight
    #[inline]
    #[must_use]
    pub fn is_creating(&self) -> bool {
        self.creating.load(Ordering::SeqCst)
    }

    /// Retrier used for mutations
    #[inline]
    #[must_use]
    pub fn retrier(&self) -> &RevisionConflictRetrier {
        &self.retrier
    }

    /// Allocate a new server session and attach to it
    ///
    /// A second call while one is in flight is rejected rather than
    /// allocating a second session. On failure the previous phase is kept.
    ///
    /// # Errors
    /// [`SessionError::InvalidState`] while another creation is in flight,
    /// [`SessionError::Create`] when the server refuses or is unreachable
    pub async fn create_session(
        &self,
        definition_id: &str,
        version: Option<u32>,
    ) -> Result<SessionId, SessionError> {
        if self.creating.swap(true, Ordering::SeqCst) {
            return Err(SessionError::InvalidState {
                operation: "create_session",
                phase: PhaseKind::Creating,
            });
        }

        let previous = {
            let mut state = self.state.write();
            std::mem::replace(&mut state.phase, ClientPhase::Creating)
        };
        let guard = CreationGuard {
            client: self,
            previous: Some(previous),
        };

        let request = CreateSessionRequest {
            wizard_definition_id: definition_id.to_string(),
            wizard_definition_version: version,
        };
        let session = self.transport.create(&request).await.map_err(|e| {
            tracing::warn!(definition = definition_id, error = %e, "session creation failed");
            match e {
                SessionError::Create(_) => e,
                other => SessionError::Create(other.to_string()),
            }
        })?;

        let session_id = session.session_id.clone();
        self.retrier.reset();
        self.adopt(session);
        guard.commit();

        tracing::info!(session = %session_id, definition = definition_id, "wizard session created");
        Ok(session_id)
    }

    /// Attach to an existing server session
    ///
    /// # Errors
    /// [`SessionError::InvalidState`] while a creation is in flight, or the
    /// transport error (typically [`SessionError::NotFound`])
    pub async fn resume(&self, session_id: &SessionId) -> Result<WizardSession, SessionError> {
        if self.is_creating() {
            return Err(SessionError::InvalidState {
                operation: "resume",
                phase: PhaseKind::Creating,
            });
        }
        let session = self.transport.get_state(session_id).await?;
        self.retrier.reset();
        self.adopt(session.clone());
        tracing::info!(session = %session_id, step = %session.current_step_id, "wizard session resumed");
        Ok(session)
    }

    /// Detach from the current session without touching the server
    pub fn abandon(&self) {
        let mut state = self.state.write();
        if let Some(id) = state.phase.session_id() {
            tracing::info!(session = %id, "wizard session abandoned");
        }
        state.phase = ClientPhase::Uninitialized;
        state.session = None;
        self.retrier.reset();
    }

    /// Move the session to `target`
    ///
    /// Prerequisite failures come back unchanged; only revision conflicts
    /// are retried.
    ///
    /// # Errors
    /// [`SessionError::InvalidState`] outside `Active`,
    /// [`SessionError::Prerequisite`] when the target is not yet reachable,
    /// [`SessionError::RevisionConflict`] once retries are exhausted
    pub async fn navigate(&self, target: &StepId) -> Result<WizardSession, SessionError> {
        let session_id = self.require_active("navigate")?;
        let sid = &session_id;

        let session = self
            .retrier
            .retry(
                None,
                move |rev| self.transport.navigate(sid, target, rev),
                move || self.fetch_current_revision(sid),
            )
            .await
            .map_err(|e| {
                if let Some(failure) = e.prerequisite() {
                    tracing::warn!(
                        target = %target,
                        missing = ?failure.missing,
                        "navigation blocked by prerequisites"
                    );
                }
                e
            })?;

        tracing::debug!(session = %sid, step = %session.current_step_id, revision = %session.revision, "navigated");
        self.apply_session(session.clone());
        Ok(session)
    }

    /// Ask the server whether `input` is acceptable for `step`
    ///
    /// Fails closed: no attached session or an unreachable server yields
    /// `false`.
    pub async fn validate_input(&self, step: &StepId, input: &Value) -> bool {
        let Some(session_id) = self.session_id() else {
            tracing::warn!(step = %step, "validation requested without a session");
            return false;
        };
        match self.transport.validate(&session_id, step, input).await {
            Ok(outcome) => {
                if !outcome.valid {
                    tracing::debug!(step = %step, errors = ?outcome.errors, "input rejected");
                }
                outcome.valid
            }
            Err(e) => {
                tracing::warn!(step = %step, error = %e, "validation unavailable, failing closed");
                false
            }
        }
    }

    /// Run a business action; returns the action output
    ///
    /// `revision` overrides the last known revision for the first attempt.
    ///
    /// # Errors
    /// [`SessionError::InvalidState`] outside `Active`, or the terminal
    /// transport/conflict error
    pub async fn execute_action(
        &self,
        step: &StepId,
        action: &ActionId,
        input: &Value,
        revision: Option<Revision>,
    ) -> Result<Value, SessionError> {
        let session_id = self.require_active("execute_action")?;
        let sid = &session_id;

        let outcome = self
            .retrier
            .retry(
                revision,
                move |rev| self.transport.execute_action(sid, step, action, input, rev),
                move || self.fetch_current_revision(sid),
            )
            .await?;

        tracing::info!(
            session = %sid,
            step = %step,
            action = %action,
            revision = %outcome.session.revision,
            "action executed"
        );
        self.apply_session(outcome.session);
        Ok(outcome.output)
    }

    /// Commit a step's output
    ///
    /// # Errors
    /// [`SessionError::InvalidState`] outside `Active`, or the terminal
    /// transport/conflict error
    pub async fn mark_step_completed(
        &self,
        step: &StepId,
        output: &Value,
    ) -> Result<WizardSession, SessionError> {
        let session_id = self.require_active("mark_step_completed")?;
        let sid = &session_id;

        let session = self
            .retrier
            .retry(
                None,
                move |rev| self.transport.mark_step_completed(sid, step, output, rev),
                move || self.fetch_current_revision(sid),
            )
            .await?;

        tracing::info!(session = %sid, step = %step, status = %session.status, "step completed");
        self.apply_session(session.clone());
        Ok(session)
    }

    /// Fetch and apply the server's current state
    ///
    /// # Errors
    /// [`SessionError::InvalidState`] without an attached session, or the
    /// transport error
    pub async fn get_state(&self) -> Result<WizardSession, SessionError> {
        let session_id = self.require_attached("get_state")?;
        let session = self.transport.get_state(&session_id).await?;
        self.apply_session(session.clone());
        Ok(session)
    }

    /// Result of a completed session
    ///
    /// # Errors
    /// [`SessionError::ResultUnavailable`] unless the session is completed
    pub async fn get_result(&self) -> Result<WizardResult, SessionError> {
        let status = match self.session() {
            Some(session) if session.is_completed() => SessionStatus::Completed,
            _ => self.get_state().await?.status,
        };
        if status != SessionStatus::Completed {
            return Err(SessionError::ResultUnavailable(status));
        }
        let session_id = self.require_attached("get_result")?;
        self.transport.get_result(&session_id).await
    }

    async fn fetch_current_revision(&self, session_id: &SessionId) -> Result<Revision, SessionError> {
        let session = self.transport.get_state(session_id).await?;
        let revision = session.revision;
        self.apply_session(session);
        Ok(revision)
    }

    fn require_active(&self, operation: &'static str) -> Result<SessionId, SessionError> {
        match &self.state.read().phase {
            ClientPhase::Active { session_id, .. } => Ok(session_id.clone()),
            other => Err(SessionError::InvalidState {
                operation,
                phase: other.kind(),
            }),
        }
    }

    fn require_attached(&self, operation: &'static str) -> Result<SessionId, SessionError> {
        let state = self.state.read();
        state
            .phase
            .session_id()
            .cloned()
            .ok_or(SessionError::InvalidState {
                operation,
                phase: state.phase.kind(),
            })
    }

    /// Replace the attached session outright (create / resume)
    fn adopt(&self, session: WizardSession) {
        let mut state = self.state.write();
        self.retrier.observe(session.revision);
        transition(&mut state.phase, phase_for(&session));
        state.session = Some(session);
    }

    /// Apply a snapshot of the attached session; returns whether it was taken
    fn apply_session(&self, session: WizardSession) -> bool {
        let mut state = self.state.write();
        let Some(current) = state.session.as_ref() else {
            tracing::debug!(session = %session.session_id, "snapshot for detached client ignored");
            return false;
        };
        if current.session_id != session.session_id {
            tracing::debug!(
                attached = %current.session_id,
                received = %session.session_id,
                "snapshot for another session ignored"
            );
            return false;
        }
        if session.revision < current.revision {
            tracing::debug!(
                held = %current.revision,
                received = %session.revision,
                "older session snapshot ignored"
            );
            return false;
        }

        self.retrier.observe(session.revision);
        transition(&mut state.phase, phase_for(&session));
        state.session = Some(session);
        true
    }
}

fn phase_for(session: &WizardSession) -> ClientPhase {
    match session.status {
        SessionStatus::Active => ClientPhase::Active {
            session_id: session.session_id.clone(),
            step_id: session.current_step_id.clone(),
            revision: session.revision,
        },
        SessionStatus::Completed => ClientPhase::Completed {
            session_id: session.session_id.clone(),
        },
        SessionStatus::Error => ClientPhase::Errored {
            session_id: session.session_id.clone(),
            reason: "server reported session error".to_string(),
        },
    }
}

fn transition(phase: &mut ClientPhase, next: ClientPhase) {
    if !is_allowed(phase.kind(), next.kind()) {
        tracing::warn!(from = %phase.kind(), to = %next.kind(), "unexpected session phase transition");
    }
    *phase = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ActionOutcome, ValidationOutcome};
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use wizsync_model::SessionContext;

    fn session(rev: u64, status: SessionStatus) -> WizardSession {
        WizardSession {
            session_id: SessionId::new("s-1"),
            wizard_definition_id: "beleidsscan-wizard".into(),
            wizard_definition_version: 1,
            current_step_id: StepId::from("query-configuration"),
            revision: Revision(rev),
            status,
            context: SessionContext::new(),
            updated_at: Utc::now(),
        }
    }

    /// Single-session stub; `state` is what `get_state` returns
    struct Stub {
        state: Mutex<WizardSession>,
        reachable: bool,
    }

    impl Stub {
        fn new(reachable: bool) -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(session(0, SessionStatus::Active)),
                reachable,
            })
        }

        fn check(&self) -> Result<(), SessionError> {
            if self.reachable {
                Ok(())
            } else {
                Err(SessionError::Transport("connection refused".into()))
            }
        }
    }

    #[async_trait]
    impl SessionTransport for Stub {
        async fn create(&self, _: &CreateSessionRequest) -> Result<WizardSession, SessionError> {
            tokio::task::yield_now().await;
            self.check()?;
            Ok(self.state.lock().clone())
        }

        async fn navigate(
            &self,
            _: &SessionId,
            target: &StepId,
            _: Option<Revision>,
        ) -> Result<WizardSession, SessionError> {
            self.check()?;
            let mut s = self.state.lock();
            s.revision = s.revision.next();
            s.current_step_id = target.clone();
            Ok(s.clone())
        }

        async fn validate(
            &self,
            _: &SessionId,
            _: &StepId,
            _: &Value,
        ) -> Result<ValidationOutcome, SessionError> {
            self.check()?;
            Ok(ValidationOutcome {
                valid: true,
                errors: Vec::new(),
            })
        }

        async fn execute_action(
            &self,
            _: &SessionId,
            _: &StepId,
            _: &ActionId,
            _: &Value,
            _: Option<Revision>,
        ) -> Result<ActionOutcome, SessionError> {
            self.check()?;
            Ok(ActionOutcome {
                output: Value::Null,
                session: self.state.lock().clone(),
            })
        }

        async fn mark_step_completed(
            &self,
            _: &SessionId,
            _: &StepId,
            _: &Value,
            _: Option<Revision>,
        ) -> Result<WizardSession, SessionError> {
            self.check()?;
            Ok(self.state.lock().clone())
        }

        async fn get_state(&self, _: &SessionId) -> Result<WizardSession, SessionError> {
            self.check()?;
            Ok(self.state.lock().clone())
        }

        async fn get_result(&self, id: &SessionId) -> Result<WizardResult, SessionError> {
            self.check()?;
            Ok(WizardResult {
                session_id: id.clone(),
                summary: Value::Null,
                completed_at: Utc::now(),
            })
        }
    }

    #[tokio::test]
    async fn navigation_requires_active_phase() {
        let client = WizardSessionClient::new(Stub::new(true));
        let err = client.navigate(&StepId::from("website-selection")).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidState {
                operation: "navigate",
                phase: PhaseKind::Uninitialized
            }
        ));
    }

    #[tokio::test]
    async fn concurrent_create_is_rejected() {
        let client = WizardSessionClient::new(Stub::new(true));
        let (first, second) = tokio::join!(
            client.create_session("beleidsscan-wizard", None),
            client.create_session("beleidsscan-wizard", None)
        );
        assert!(first.is_ok());
        assert!(matches!(
            second,
            Err(SessionError::InvalidState {
                phase: PhaseKind::Creating,
                ..
            })
        ));
        assert!(!client.is_creating());
        assert_eq!(client.phase().kind(), PhaseKind::Active);
    }

    #[tokio::test]
    async fn failed_create_restores_phase() {
        let client = WizardSessionClient::new(Stub::new(false));
        let err = client.create_session("beleidsscan-wizard", None).await.unwrap_err();
        assert!(matches!(err, SessionError::Create(_)));
        assert_eq!(client.phase(), ClientPhase::Uninitialized);
        assert!(!client.is_creating());
    }

    #[tokio::test]
    async fn older_snapshot_is_ignored() {
        let stub = Stub::new(true);
        let client = WizardSessionClient::new(stub.clone());
        client.create_session("beleidsscan-wizard", None).await.unwrap();
        client.navigate(&StepId::from("website-selection")).await.unwrap();
        assert_eq!(client.revision(), Some(Revision(1)));

        assert!(!client.apply_session(session(0, SessionStatus::Active)));
        assert_eq!(client.revision(), Some(Revision(1)));
        assert_eq!(
            client.session().map(|s| s.current_step_id),
            Some(StepId::from("website-selection"))
        );
    }

    #[tokio::test]
    async fn result_requires_completion() {
        let stub = Stub::new(true);
        let client = WizardSessionClient::new(stub.clone());
        client.create_session("beleidsscan-wizard", None).await.unwrap();

        let err = client.get_result().await.unwrap_err();
        assert!(matches!(err, SessionError::ResultUnavailable(SessionStatus::Active)));

        *stub.state.lock() = session(3, SessionStatus::Completed);
        assert!(client.get_result().await.is_ok());
        assert_eq!(client.phase().kind(), PhaseKind::Completed);
    }

    #[tokio::test]
    async fn abandon_detaches() {
        let client = WizardSessionClient::new(Stub::new(true));
        client.create_session("beleidsscan-wizard", None).await.unwrap();
        client.abandon();
        assert_eq!(client.phase(), ClientPhase::Uninitialized);
        assert!(client.session().is_none());
        assert!(client.retrier().last_known().is_none());
        assert!(!client.validate_input(&StepId::from("query-configuration"), &Value::Null).await);
    }
}
