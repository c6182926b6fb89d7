//! Divergence detection

use serde::Serialize;
use std::collections::BTreeSet;
use wizsync_model::{has_meaningful_state, LocalDraft, SessionStateCodec, WizardSession};

/// Outcome of comparing the local draft with server state at attach time
///
/// Consumed by exactly one resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResult {
    /// Whether the user must choose a resolution
    pub has_conflict: bool,
    /// Draft found locally
    pub client_draft: Option<LocalDraft>,
    /// Server session at attach time
    pub server_state: Option<WizardSession>,
    /// Context fields on which the two disagree
    pub divergent_fields: BTreeSet<String>,
}

impl ReconciliationResult {
    /// Verdict without conflict
    #[must_use]
    pub fn none(client_draft: Option<LocalDraft>, server_state: Option<WizardSession>) -> Self {
        Self {
            has_conflict: false,
            client_draft,
            server_state,
            divergent_fields: BTreeSet::new(),
        }
    }
}

/// Compare `draft` with `server`
///
/// A conflict needs a meaningful draft, an existing server session and at
/// least one context field the two disagree on. No server session is never
/// a conflict.
#[must_use]
pub fn detect(
    codec: &SessionStateCodec,
    draft: Option<LocalDraft>,
    server: Option<WizardSession>,
) -> ReconciliationResult {
    let (Some(local), Some(session)) = (draft.as_ref(), server.as_ref()) else {
        return ReconciliationResult::none(draft, server);
    };
    if !has_meaningful_state(local) {
        return ReconciliationResult::none(draft, server);
    }

    let divergent_fields = codec.divergent_fields(local, &session.context);
    ReconciliationResult {
        has_conflict: !divergent_fields.is_empty(),
        client_draft: draft,
        server_state: server,
        divergent_fields,
    }
}
