//! Wizard coordinator
//!
//! Owns the wizard UI state and wires it through the session client, the
//! draft store, the reconciliation engine, the document loader and the scan
//! monitor. The UI state is the single source for autosave snapshots.

use crate::config::WizsyncConfig;
use crate::error::{Result, WizsyncError};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use wizsync_draft::{
    DraftStore, FileStore, LocalStore, MemoryStore, ProgressSnapshots, SelectionCache,
};
use wizsync_guard::{
    AsyncLoadGuard, DocumentLoader, DocumentSource, HttpDocumentSource, HttpProgressSource,
    LoadOutcome, ProgressSource, ScanMonitor, ScanView,
};
use wizsync_model::steps::actions::{CREATE_QUERY, START_SCAN};
use wizsync_model::steps::DOCUMENT_REVIEW;
use wizsync_model::{
    fields, ActionId, Document, LocalDraft, QueryId, RunId, ScanProgress, SessionId,
    SessionStateCodec, StepIndex, WizardResult,
};
use wizsync_reconcile::{ConflictResolution, ReconciliationEngine, ReconciliationResult, ResolvedState};
use wizsync_session::{
    HttpSessionTransport, PrerequisiteFailure, SessionError, SessionTransport,
    WizardSessionClient,
};

/// External services the coordinator talks to
#[derive(Clone)]
pub struct Backends {
    /// Session RPC
    pub transport: Arc<dyn SessionTransport>,
    /// Local key/value store
    pub store: Arc<dyn LocalStore>,
    /// Document listings
    pub documents: Arc<dyn DocumentSource>,
    /// Scan progress and cancellation
    pub progress: Arc<dyn ProgressSource>,
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}

impl Backends {
    /// HTTP backends against `server.base_url`, storage per `draft.store_dir`
    ///
    /// # Errors
    /// HTTP client construction or store directory failures
    pub fn from_config(config: &WizsyncConfig) -> Result<Self> {
        let base = config.server.base_url.as_str();
        let timeout = config.request_timeout();
        let store: Arc<dyn LocalStore> = match &config.draft.store_dir {
            Some(dir) => Arc::new(FileStore::open(dir)?),
            None => Arc::new(MemoryStore::new()),
        };
        Ok(Self {
            transport: Arc::new(HttpSessionTransport::with_timeout(base, timeout)?),
            store,
            documents: Arc::new(HttpDocumentSource::new(base, timeout)?),
            progress: Arc::new(HttpProgressSource::new(base, timeout)?),
        })
    }
}

/// Result of a step change request
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationOutcome {
    /// The server moved to the requested step
    Navigated {
        /// Step now shown
        step: StepIndex,
    },
    /// Prerequisites are missing on the server; the UI moved anyway
    LocalFallback {
        /// Step now shown
        step: StepIndex,
        /// What the server says is missing, for the warning
        failure: PrerequisiteFailure,
    },
    /// No active or reachable session; the UI moved locally
    Detached {
        /// Step now shown
        step: StepIndex,
        /// Why the server was not involved
        reason: String,
    },
}

impl NavigationOutcome {
    /// Step now shown
    #[must_use]
    pub fn step(&self) -> StepIndex {
        match self {
            Self::Navigated { step }
            | Self::LocalFallback { step, .. }
            | Self::Detached { step, .. } => *step,
        }
    }
}

/// Facade over one wizard instance
pub struct WizardCoordinator {
    config: WizsyncConfig,
    codec: SessionStateCodec,
    ui: Arc<RwLock<LocalDraft>>,
    client: Arc<WizardSessionClient>,
    drafts: DraftStore,
    engine: ReconciliationEngine,
    selections: SelectionCache,
    documents: DocumentLoader,
    scans: ScanMonitor,
}

impl std::fmt::Debug for WizardCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WizardCoordinator")
            .field("phase", &self.client.phase())
            .field("step", &self.ui.read().step)
            .finish_non_exhaustive()
    }
}

impl WizardCoordinator {
    /// Coordinator over explicit backends
    ///
    /// # Errors
    /// [`WizsyncError::Config`] for an invalid configuration
    pub fn new(config: WizsyncConfig, backends: Backends) -> Result<Self> {
        config.validate()?;
        let codec = SessionStateCodec::new(config.step_layout()?);

        let ui = Arc::new(RwLock::new(LocalDraft::default()));
        let snapshot = Arc::clone(&ui);
        let drafts = DraftStore::new(
            Arc::clone(&backends.store),
            config.draft_store_config(),
            move || snapshot.read().clone(),
        );

        let client = Arc::new(
            WizardSessionClient::new(backends.transport).with_retrier(config.retrier()),
        );
        let engine = ReconciliationEngine::new(Arc::clone(&client), drafts.clone(), codec.clone());
        let documents = DocumentLoader::new(
            backends.documents,
            Arc::new(AsyncLoadGuard::new(config.dedup_window())),
        );
        let scans = ScanMonitor::new(backends.progress, config.scan_monitor_config())
            .with_snapshots(ProgressSnapshots::new(Arc::clone(&backends.store)));

        Ok(Self {
            selections: SelectionCache::new(backends.store),
            config,
            codec,
            ui,
            client,
            drafts,
            engine,
            documents,
            scans,
        })
    }

    /// Coordinator over HTTP backends built from `config`
    ///
    /// # Errors
    /// Backend construction or configuration errors
    pub fn from_config(config: WizsyncConfig) -> Result<Self> {
        let backends = Backends::from_config(&config)?;
        Self::new(config, backends)
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &WizsyncConfig {
        &self.config
    }

    /// Session client
    #[inline]
    #[must_use]
    pub fn client(&self) -> &Arc<WizardSessionClient> {
        &self.client
    }

    /// Draft slot
    #[inline]
    #[must_use]
    pub fn drafts(&self) -> &DraftStore {
        &self.drafts
    }

    /// Reconciliation engine
    #[inline]
    #[must_use]
    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    /// Document loader of step 3
    #[inline]
    #[must_use]
    pub fn documents(&self) -> &DocumentLoader {
        &self.documents
    }

    /// Scan monitor
    #[inline]
    #[must_use]
    pub fn scans(&self) -> &ScanMonitor {
        &self.scans
    }

    /// Copy of the UI state
    #[must_use]
    pub fn state(&self) -> LocalDraft {
        self.ui.read().clone()
    }

    /// Change the UI state and schedule an autosave
    pub fn edit(&self, f: impl FnOnce(&mut LocalDraft)) {
        f(&mut self.ui.write());
        self.drafts.save_draft();
    }

    /// Create a session and reconcile it with any stored draft
    ///
    /// A fresh session has no context, so the draft is offered for restore
    /// without conflict.
    ///
    /// # Errors
    /// Session creation failure
    pub async fn start(&self) -> Result<ReconciliationResult> {
        let pending = self.drafts.check_for_restore();
        if self.client.session_id().is_none() {
            self.client
                .create_session(&self.config.wizard.definition_id, self.config.wizard.definition_version)
                .await?;
        }
        Ok(self.engine.attach(pending).await)
    }

    /// Attach to an existing session and reconcile it with the stored draft
    ///
    /// Without a conflict the UI follows the server; a stored draft stays
    /// on offer for [`Self::restore_draft`].
    ///
    /// # Errors
    /// The session cannot be fetched
    pub async fn resume(&self, session_id: &SessionId) -> Result<ReconciliationResult> {
        let pending = self.drafts.check_for_restore();
        let session = self.client.resume(session_id).await?;
        let verdict = self.engine.attach(pending).await;
        if !verdict.has_conflict {
            self.replace_ui(self.codec.draft_from_session(&session));
        }
        Ok(verdict)
    }

    /// Load the offered draft into the UI
    pub fn restore_draft(&self) -> bool {
        self.drafts.restore_draft(|draft| self.replace_ui(draft.clone()))
    }

    /// Apply the user's choice and load the resulting state into the UI
    pub async fn resolve(&self, resolution: ConflictResolution) -> Option<ResolvedState> {
        let resolved = self.engine.resolve(resolution).await?;
        self.replace_ui(resolved.draft.clone());
        Some(resolved)
    }

    /// Move to step `index`
    ///
    /// The user is never blocked: missing prerequisites, an inactive
    /// session or an unreachable server still move the UI to `index`, and
    /// the outcome says why the server did not follow. Entering the document
    /// review step loads its documents.
    ///
    /// # Errors
    /// Unknown step, or a session failure that leaves the session unusable
    /// (missing session, exhausted conflict retries)
    pub async fn go_to_step(&self, index: StepIndex) -> Result<NavigationOutcome> {
        let target = self.step_id(index)?;

        let outcome = match self.client.navigate(&target).await {
            Ok(session) => {
                let step = self.codec.step_index_or_first(&session.current_step_id);
                tracing::info!(step = %step, "step entered");
                NavigationOutcome::Navigated { step }
            }
            Err(SessionError::Prerequisite(failure)) => {
                tracing::warn!(
                    target = %target,
                    missing = ?failure.missing,
                    suggestion = %failure.suggestion,
                    "prerequisites missing, navigating locally"
                );
                NavigationOutcome::LocalFallback { step: index, failure }
            }
            Err(e) if matches!(e, SessionError::InvalidState { .. }) || e.is_unreachable() => {
                tracing::warn!(target = %target, error = %e, "session unavailable, navigating locally");
                NavigationOutcome::Detached {
                    step: index,
                    reason: e.to_string(),
                }
            }
            Err(e) => return Err(e.into()),
        };

        let step = outcome.step();
        self.edit(|ui| ui.step = step);
        if self.codec.step_id(step).is_some_and(|id| id.as_str() == DOCUMENT_REVIEW) {
            self.enter_document_step().await;
        }
        Ok(outcome)
    }

    /// Create the query from the step 1 inputs
    ///
    /// # Errors
    /// [`WizsyncError::Missing`] without a topic, session failures, or an
    /// output without `queryId`
    pub async fn create_query(&self) -> Result<QueryId> {
        let input = {
            let ui = self.ui.read();
            if ui.onderwerp.trim().is_empty() {
                return Err(WizsyncError::Missing(fields::ONDERWERP));
            }
            context_json(&self.codec, &ui)
        };
        let step = self.step_id(StepIndex::FIRST)?;
        let output = self
            .client
            .execute_action(&step, &ActionId::from(CREATE_QUERY), &input, None)
            .await?;
        let query = output
            .get(fields::QUERY_ID)
            .and_then(Value::as_str)
            .map(QueryId::new)
            .ok_or(WizsyncError::MalformedOutput(fields::QUERY_ID))?;

        self.switch_query(&query);
        tracing::info!(query = %query, "query created");
        Ok(query)
    }

    /// Replace the website selection of the current query
    pub fn select_websites(&self, websites: Vec<String>) {
        let query = self.ui.read().query_id.clone();
        if let Some(query) = &query {
            self.selections.save(query, &websites);
        }
        self.edit(|ui| ui.selected_websites = websites);
    }

    /// Selection remembered for the current query
    #[must_use]
    pub fn remembered_websites(&self) -> Vec<String> {
        self.ui
            .read()
            .query_id
            .as_ref()
            .map(|q| self.selections.load(q))
            .unwrap_or_default()
    }

    /// Start scraping the selected websites and follow the run
    ///
    /// On completion the documents are refreshed if the query is still shown.
    ///
    /// # Errors
    /// [`WizsyncError::Missing`] without a query or a selection, session
    /// failures, or an output without `runId`
    pub async fn start_scan(&self, push: Option<mpsc::Receiver<ScanProgress>>) -> Result<RunId> {
        let (query, websites) = {
            let ui = self.ui.read();
            let query = ui.query_id.clone().ok_or(WizsyncError::Missing(fields::QUERY_ID))?;
            if ui.selected_websites.is_empty() {
                return Err(WizsyncError::Missing(fields::SELECTED_WEBSITES));
            }
            (query, ui.selected_websites.clone())
        };
        let step = self.step_id(StepIndex(2))?;
        let input = serde_json::json!({ (fields::SELECTED_WEBSITES): websites });
        let output = self
            .client
            .execute_action(&step, &ActionId::from(START_SCAN), &input, None)
            .await?;
        let run = output
            .get("runId")
            .and_then(Value::as_str)
            .map(RunId::new)
            .ok_or(WizsyncError::MalformedOutput("runId"))?;

        let documents = self.documents.clone();
        let ui = Arc::clone(&self.ui);
        self.scans.start(run.clone(), push, move |progress| {
            if ui.read().query_id.as_ref() != Some(&query) {
                tracing::debug!(run = %progress.run_id, query = %query, "scan done for a query no longer shown");
                return;
            }
            tracing::info!(run = %progress.run_id, status = ?progress.status, "scan done, refreshing documents");
            tokio::spawn(async move {
                if documents.refresh(&query).await.is_applied() {
                    let docs = documents.documents();
                    let mut ui = ui.write();
                    if ui.query_id.as_ref() == Some(&query) {
                        ui.documents = docs;
                    }
                }
            });
        });
        Ok(run)
    }

    /// Stop the running scan
    pub fn stop_scan(&self) {
        self.scans.stop();
    }

    /// Progress of the followed run
    #[must_use]
    pub fn scan_view(&self) -> ScanView {
        self.scans.view()
    }

    /// Load the documents of the current query
    ///
    /// `None` without a query. A repeat entry within the dedup window
    /// fetches nothing. Until a load applies, the UI keeps only documents
    /// of this query, so a pending or failed load shows none.
    pub async fn enter_document_step(&self) -> Option<LoadOutcome<QueryId, Vec<Document>>> {
        let query = self.ui.read().query_id.clone()?;
        let outcome = self.documents.load(&query).await;
        if outcome.is_applied() {
            let docs = self.documents.documents();
            self.edit(|ui| {
                if ui.query_id.as_ref() == Some(&query) {
                    ui.documents = docs;
                }
            });
        }
        Some(outcome)
    }

    /// Commit the final step, fetch the result and drop local state
    ///
    /// # Errors
    /// Session failures; local state is kept on error
    pub async fn complete(&self) -> Result<WizardResult> {
        let last = self
            .codec
            .layout()
            .iter()
            .last()
            .cloned()
            .ok_or(WizsyncError::UnknownStep(StepIndex::FIRST))?;
        let output = context_json(&self.codec, &self.ui.read());
        self.client.mark_step_completed(&last, &output).await?;
        let result = self.client.get_result().await?;

        self.drafts.clear_draft();
        let query = self.ui.read().query_id.clone();
        if let Some(query) = query {
            self.selections.clear(&query);
        }
        tracing::info!(session = %result.session_id, "wizard completed");
        Ok(result)
    }

    /// Page hidden: flush the draft now
    pub fn on_visibility_hidden(&self) {
        self.drafts.save_draft_sync();
    }

    /// Page unloading: flush the draft now
    pub fn on_before_unload(&self) {
        self.drafts.save_draft_sync();
    }

    /// Explicit save button
    ///
    /// # Errors
    /// [`WizsyncError::Storage`] so the UI can tell the user once
    pub fn save_now(&self) -> Result<()> {
        self.drafts.save_draft_now().map_err(Into::into)
    }

    /// Make `query` the current one; documents of another query are dropped
    fn switch_query(&self, query: &QueryId) {
        if self.documents.active_query().is_some_and(|active| &active != query) {
            self.documents.clear();
        }
        self.edit(|ui| {
            if ui.query_id.as_ref() != Some(query) {
                ui.documents.clear();
                ui.query_id = Some(query.clone());
            }
        });
    }

    /// Replace the whole UI state, releasing loads for any other query
    fn replace_ui(&self, draft: LocalDraft) {
        if self.documents.active_query().is_some_and(|active| draft.query_id.as_ref() != Some(&active)) {
            self.documents.clear();
        }
        *self.ui.write() = draft;
    }

    fn step_id(&self, index: StepIndex) -> Result<wizsync_model::StepId> {
        self.codec
            .step_id(index)
            .cloned()
            .ok_or(WizsyncError::UnknownStep(index))
    }
}

fn context_json(codec: &SessionStateCodec, draft: &LocalDraft) -> Value {
    serde_json::to_value(codec.draft_to_context(draft)).unwrap_or(Value::Null)
}
