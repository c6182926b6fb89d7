//! Conflict resolution between the local draft and the server session
//!
//! Every resolution consumes the pending verdict, drops the restore offer
//! and deletes the stored draft, then hands back the UI state to show.
//! [`ReconciliationEngine::ignore_conflict`] cannot fail: if the server
//! reload fails the UI lands on the first step.

use crate::verdict::{detect, ReconciliationResult};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use wizsync_draft::DraftStore;
use wizsync_model::{LocalDraft, SessionStateCodec, StepIndex, WizardSession};
use wizsync_session::WizardSessionClient;

/// The four user choices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictResolution {
    /// Keep the local draft
    UseClientDraft,
    /// Take the server state
    UseServerState,
    /// Union per field, server wins where both have a value
    MergeDrafts,
    /// Drop everything local and reload from the server
    IgnoreConflict,
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UseClientDraft => "use-client-draft",
            Self::UseServerState => "use-server-state",
            Self::MergeDrafts => "merge-drafts",
            Self::IgnoreConflict => "ignore-conflict",
        };
        f.write_str(s)
    }
}

/// UI state chosen by a resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedState {
    /// Resolution applied
    pub resolution: ConflictResolution,
    /// State to load into the wizard UI
    pub draft: LocalDraft,
    /// Server session the state was derived from, if any
    pub server_state: Option<WizardSession>,
}

/// Detects draft/server divergence on attach and applies the user's choice
pub struct ReconciliationEngine {
    client: Arc<WizardSessionClient>,
    drafts: DraftStore,
    codec: SessionStateCodec,
    pending: Mutex<Option<ReconciliationResult>>,
}

impl fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("has_conflict", &self.has_conflict())
            .finish_non_exhaustive()
    }
}

impl ReconciliationEngine {
    /// Engine over a session client and a draft slot
    #[must_use]
    pub fn new(client: Arc<WizardSessionClient>, drafts: DraftStore, codec: SessionStateCodec) -> Self {
        Self {
            client,
            drafts,
            codec,
            pending: Mutex::new(None),
        }
    }

    /// Compare `pending_draft` with the server state, fetched once
    ///
    /// An unreachable server or an unattached client counts as "no server
    /// session". A conflict is kept until one resolution consumes it.
    pub async fn attach(&self, pending_draft: Option<LocalDraft>) -> ReconciliationResult {
        let server = if self.client.session_id().is_some() {
            match self.client.get_state().await {
                Ok(session) => Some(session),
                Err(e) => {
                    tracing::warn!(error = %e, "server state unavailable during reconciliation");
                    None
                }
            }
        } else {
            None
        };

        let result = detect(&self.codec, pending_draft, server);
        if result.has_conflict {
            tracing::info!(fields = ?result.divergent_fields, "draft conflicts with server state");
            *self.pending.lock() = Some(result.clone());
        } else {
            tracing::debug!("no reconciliation conflict");
            self.pending.lock().take();
        }
        result
    }

    /// Whether a conflict awaits resolution
    #[must_use]
    pub fn has_conflict(&self) -> bool {
        self.pending.lock().as_ref().is_some_and(|r| r.has_conflict)
    }

    /// Unresolved verdict
    #[must_use]
    pub fn pending(&self) -> Option<ReconciliationResult> {
        self.pending.lock().clone()
    }

    /// Codec in use
    #[inline]
    #[must_use]
    pub fn codec(&self) -> &SessionStateCodec {
        &self.codec
    }

    /// Keep the local draft; the server is not written
    ///
    /// `None` when there is nothing to resolve.
    pub fn use_client_draft(&self) -> Option<ResolvedState> {
        let (draft, server) = self.consume()?;
        let draft = draft?;
        Some(self.finish(ConflictResolution::UseClientDraft, draft, server))
    }

    /// Replace the UI state with the server's
    ///
    /// `None` when there is nothing to resolve.
    pub fn use_server_state(&self) -> Option<ResolvedState> {
        let (_, server) = self.consume()?;
        let session = server?;
        let draft = self.codec.draft_from_session(&session);
        Some(self.finish(ConflictResolution::UseServerState, draft, Some(session)))
    }

    /// Union of both sides, server winning on fields it has a value for
    ///
    /// View-only state comes from the draft, the step from the server.
    /// `None` when there is nothing to resolve.
    pub fn merge_drafts(&self) -> Option<ResolvedState> {
        let (draft, server) = self.consume()?;
        let (mut merged, session) = match (draft, server) {
            (Some(draft), Some(session)) => (draft, session),
            (Some(draft), None) => return Some(self.finish(ConflictResolution::MergeDrafts, draft, None)),
            (None, Some(session)) => {
                let draft = self.codec.draft_from_session(&session);
                return Some(self.finish(ConflictResolution::MergeDrafts, draft, Some(session)));
            }
            (None, None) => return None,
        };
        self.codec.overlay_context(&mut merged, &session.context);
        merged.step = self.codec.step_index_or_first(&session.current_step_id);
        merged.timestamp = Utc::now();
        Some(self.finish(ConflictResolution::MergeDrafts, merged, Some(session)))
    }

    /// Drop local state and reload from the server
    ///
    /// Always succeeds and may be called at any time: the verdict and the
    /// stored draft are cleared before the reload, and a failed reload or a
    /// server without usable context lands on the first step.
    pub async fn ignore_conflict(&self) -> ResolvedState {
        self.pending.lock().take();
        self.drafts.discard_draft();
        self.drafts.clear_draft();

        let server = if self.client.session_id().is_some() {
            match self.client.get_state().await {
                Ok(session) => Some(session),
                Err(e) => {
                    tracing::warn!(error = %e, "reload after ignored conflict failed, starting over");
                    None
                }
            }
        } else {
            None
        };

        let draft = match &server {
            Some(session) if session.context.has_usable_fields() => {
                self.codec.draft_from_session(session)
            }
            _ => LocalDraft::at_step(StepIndex::FIRST),
        };
        tracing::info!(resolution = %ConflictResolution::IgnoreConflict, step = %draft.step, "conflict resolved");
        ResolvedState {
            resolution: ConflictResolution::IgnoreConflict,
            draft,
            server_state: server,
        }
    }

    /// Apply `resolution`
    ///
    /// `None` when a non-ignore resolution finds nothing to resolve.
    pub async fn resolve(&self, resolution: ConflictResolution) -> Option<ResolvedState> {
        match resolution {
            ConflictResolution::UseClientDraft => self.use_client_draft(),
            ConflictResolution::UseServerState => self.use_server_state(),
            ConflictResolution::MergeDrafts => self.merge_drafts(),
            ConflictResolution::IgnoreConflict => Some(self.ignore_conflict().await),
        }
    }

    fn consume(&self) -> Option<(Option<LocalDraft>, Option<WizardSession>)> {
        let result = self.pending.lock().take()?;
        Some((result.client_draft, result.server_state))
    }

    fn finish(
        &self,
        resolution: ConflictResolution,
        draft: LocalDraft,
        server_state: Option<WizardSession>,
    ) -> ResolvedState {
        self.drafts.discard_draft();
        self.drafts.clear_draft();
        tracing::info!(resolution = %resolution, step = %draft.step, "conflict resolved");
        ResolvedState {
            resolution,
            draft,
            server_state,
        }
    }
}
