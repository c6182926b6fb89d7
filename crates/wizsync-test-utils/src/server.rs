//! In-memory wizard session server
//!
//! Honours revisions (stale revision -> conflict), step prerequisites and the
//! three business actions of the research wizard. Contention and outages are
//! injected explicitly.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use wizsync_model::steps::actions::{CREATE_QUERY, GENERATE_SUGGESTIONS, START_SCAN};
use wizsync_model::steps::{DOCUMENT_REVIEW, WEBSITE_SELECTION};
use wizsync_model::{
    fields, ActionId, Revision, RunId, SessionContext, SessionId, SessionStatus, StepId,
    StepLayout, WizardResult, WizardSession,
};
use wizsync_session::{
    ActionOutcome, CreateSessionRequest, PrerequisiteFailure, SessionError, SessionTransport,
    ValidationOutcome,
};

pub const DEFINITION_ID: &str = "beleidsscan-wizard";

#[derive(Debug)]
pub struct MockSessionServer {
    layout: StepLayout,
    definitions: HashSet<String>,
    sessions: DashMap<SessionId, WizardSession>,
    runs: DashMap<RunId, SessionId>,
    calls: DashMap<&'static str, u32>,
    unreachable: AtomicBool,
    pending_contention: AtomicU32,
}

impl Default for MockSessionServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSessionServer {
    pub fn new() -> Self {
        Self {
            layout: StepLayout::default(),
            definitions: HashSet::from([DEFINITION_ID.to_string()]),
            sessions: DashMap::new(),
            runs: DashMap::new(),
            calls: DashMap::new(),
            unreachable: AtomicBool::new(false),
            pending_contention: AtomicU32::new(0),
        }
    }

    /// Every call fails with a transport error while set
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// The next `n` mutations each race a concurrent writer and lose
    pub fn inject_contention(&self, n: u32) {
        self.pending_contention.store(n, Ordering::SeqCst);
    }

    /// Another writer commits to `session` behind the client's back
    pub fn bump_revision(&self, session: &SessionId) {
        if let Some(mut s) = self.sessions.get_mut(session) {
            s.revision = s.revision.next();
            s.updated_at = Utc::now();
        }
    }

    /// Server-side edit of one context field, bumping the revision
    pub fn set_context(&self, session: &SessionId, key: &str, value: impl Into<Value>) {
        if let Some(mut s) = self.sessions.get_mut(session) {
            s.context.set(key, value);
            s.revision = s.revision.next();
            s.updated_at = Utc::now();
        }
    }

    /// Place a session in the store directly
    pub fn insert(&self, session: WizardSession) {
        self.sessions.insert(session.session_id.clone(), session);
    }

    pub fn session(&self, session: &SessionId) -> Option<WizardSession> {
        self.sessions.get(session).map(|s| s.clone())
    }

    pub fn revision(&self, session: &SessionId) -> Option<Revision> {
        self.sessions.get(session).map(|s| s.revision)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn run_session(&self, run: &RunId) -> Option<SessionId> {
        self.runs.get(run).map(|s| s.clone())
    }

    pub fn calls(&self, op: &str) -> u32 {
        self.calls.get(op).map_or(0, |c| *c)
    }

    fn record(&self, op: &'static str) -> Result<(), SessionError> {
        *self.calls.entry(op).or_insert(0) += 1;
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SessionError::Transport("connection refused".into()));
        }
        Ok(())
    }

    /// Run `mutate` against the session if `presented` matches its revision
    fn mutate<T>(
        &self,
        session: &SessionId,
        presented: Option<Revision>,
        mutate: impl FnOnce(&mut WizardSession) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let mut entry = self
            .sessions
            .get_mut(session)
            .ok_or_else(|| SessionError::NotFound(session.clone()))?;

        let contended = self
            .pending_contention
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if contended {
            entry.revision = entry.revision.next();
        }

        if let Some(rev) = presented {
            if rev != entry.revision {
                return Err(SessionError::RevisionConflict {
                    expected: rev,
                    actual: entry.revision,
                });
            }
        }

        if entry.status != SessionStatus::Active {
            return Err(SessionError::Http {
                status: 409,
                message: format!("session is {}", entry.status),
            });
        }

        let out = mutate(&mut entry)?;
        entry.revision = entry.revision.next();
        entry.updated_at = Utc::now();
        Ok(out)
    }

    fn prerequisites(&self, ctx: &SessionContext, target: &StepId) -> Option<PrerequisiteFailure> {
        let (missing, suggestion): (Vec<&str>, &str) = match target.as_str() {
            WEBSITE_SELECTION => (
                [fields::QUERY_ID].into_iter().filter(|k| !ctx.contains(k)).collect(),
                "Maak eerst een query aan in stap 1",
            ),
            DOCUMENT_REVIEW => (
                [fields::QUERY_ID, fields::SELECTED_WEBSITES]
                    .into_iter()
                    .filter(|k| !ctx.contains(k))
                    .collect(),
                "Selecteer eerst websites in stap 2",
            ),
            _ => (Vec::new(), ""),
        };
        (!missing.is_empty()).then(|| {
            PrerequisiteFailure::new(
                target.clone(),
                suggestion,
                missing.into_iter().map(String::from).collect(),
            )
        })
    }
}

fn merge_object(ctx: &mut SessionContext, input: &Value) {
    if let Some(map) = input.as_object() {
        for (k, v) in map {
            if !v.is_null() {
                ctx.set(k.clone(), v.clone());
            }
        }
    }
}

#[async_trait]
impl SessionTransport for MockSessionServer {
    async fn create(&self, request: &CreateSessionRequest) -> Result<WizardSession, SessionError> {
        self.record("create")
            .map_err(|e| SessionError::Create(e.to_string()))?;
        if !self.definitions.contains(&request.wizard_definition_id) {
            return Err(SessionError::Create(format!(
                "unknown wizard definition '{}'",
                request.wizard_definition_id
            )));
        }
        let session = WizardSession {
            session_id: SessionId::new(uuid::Uuid::new_v4().to_string()),
            wizard_definition_id: request.wizard_definition_id.clone(),
            wizard_definition_version: request.wizard_definition_version.unwrap_or(1),
            current_step_id: self.layout.first().clone(),
            revision: Revision::INITIAL,
            status: SessionStatus::Active,
            context: SessionContext::new(),
            updated_at: Utc::now(),
        };
        self.insert(session.clone());
        Ok(session)
    }

    async fn navigate(
        &self,
        session: &SessionId,
        target: &StepId,
        revision: Option<Revision>,
    ) -> Result<WizardSession, SessionError> {
        self.record("navigate")?;
        if self.layout.index_of(target).is_none() {
            return Err(SessionError::Http {
                status: 400,
                message: format!("unknown step '{target}'"),
            });
        }
        self.mutate(session, revision, |s| {
            if let Some(failure) = self.prerequisites(&s.context, target) {
                return Err(SessionError::Prerequisite(failure));
            }
            s.current_step_id = target.clone();
            Ok(())
        })?;
        self.session(session)
            .ok_or_else(|| SessionError::NotFound(session.clone()))
    }

    async fn validate(
        &self,
        session: &SessionId,
        step: &StepId,
        input: &Value,
    ) -> Result<ValidationOutcome, SessionError> {
        self.record("validate")?;
        if !self.sessions.contains_key(session) {
            return Err(SessionError::NotFound(session.clone()));
        }
        let mut errors = Vec::new();
        if step.as_str() == wizsync_model::steps::QUERY_CONFIGURATION {
            let onderwerp = input.get(fields::ONDERWERP).and_then(Value::as_str);
            if onderwerp.map_or(true, |s| s.trim().is_empty()) {
                errors.push("onderwerp is verplicht".to_string());
            }
        }
        Ok(ValidationOutcome {
            valid: errors.is_empty(),
            errors,
        })
    }

    async fn execute_action(
        &self,
        session: &SessionId,
        step: &StepId,
        action: &ActionId,
        input: &Value,
        revision: Option<Revision>,
    ) -> Result<ActionOutcome, SessionError> {
        self.record("execute_action")?;
        let output = self.mutate(session, revision, |s| match action.as_str() {
            CREATE_QUERY => {
                merge_object(&mut s.context, input);
                let query = format!("q-{}", uuid::Uuid::new_v4().simple());
                s.context.set(fields::QUERY_ID, query.clone());
                Ok(json!({ "queryId": query }))
            }
            GENERATE_SUGGESTIONS => match s.context.query_id() {
                Some(query) => Ok(json!({
                    "queryId": query,
                    "websites": ["https://www.amsterdam.nl", "https://www.utrecht.nl"],
                })),
                None => Err(SessionError::Prerequisite(PrerequisiteFailure::new(
                    step.clone(),
                    "Maak eerst een query aan in stap 1",
                    vec![fields::QUERY_ID.to_string()],
                ))),
            },
            START_SCAN => {
                merge_object(&mut s.context, input);
                if !s.context.contains(fields::SELECTED_WEBSITES) {
                    return Err(SessionError::Prerequisite(PrerequisiteFailure::new(
                        step.clone(),
                        "Selecteer eerst websites",
                        vec![fields::SELECTED_WEBSITES.to_string()],
                    )));
                }
                let run = RunId::new(format!("run-{}", uuid::Uuid::new_v4().simple()));
                self.runs.insert(run.clone(), s.session_id.clone());
                Ok(json!({ "runId": run }))
            }
            other => Err(SessionError::Http {
                status: 400,
                message: format!("unknown action '{other}'"),
            }),
        })?;
        let session = self
            .session(session)
            .ok_or_else(|| SessionError::NotFound(session.clone()))?;
        Ok(ActionOutcome { output, session })
    }

    async fn mark_step_completed(
        &self,
        session: &SessionId,
        step: &StepId,
        output: &Value,
        revision: Option<Revision>,
    ) -> Result<WizardSession, SessionError> {
        self.record("mark_step_completed")?;
        let last = self.layout.iter().last().cloned();
        self.mutate(session, revision, |s| {
            merge_object(&mut s.context, output);
            if last.as_ref() == Some(step) {
                s.status = SessionStatus::Completed;
            }
            Ok(())
        })?;
        self.session(session)
            .ok_or_else(|| SessionError::NotFound(session.clone()))
    }

    async fn get_state(&self, session: &SessionId) -> Result<WizardSession, SessionError> {
        self.record("get_state")?;
        self.session(session)
            .ok_or_else(|| SessionError::NotFound(session.clone()))
    }

    async fn get_result(&self, session: &SessionId) -> Result<WizardResult, SessionError> {
        self.record("get_result")?;
        let s = self
            .session(session)
            .ok_or_else(|| SessionError::NotFound(session.clone()))?;
        if s.status != SessionStatus::Completed {
            return Err(SessionError::ResultUnavailable(s.status));
        }
        let summary = serde_json::to_value(&s.context)
            .map_err(|e| SessionError::Decode(e.to_string()))?;
        Ok(WizardResult {
            session_id: s.session_id,
            summary,
            completed_at: s.updated_at,
        })
    }
}
