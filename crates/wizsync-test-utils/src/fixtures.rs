//! Canned drafts, sessions and progress reports

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use wizsync_model::{
    Document, LocalDraft, Revision, RunId, ScanProgress, ScanStatus, SessionContext, SessionId,
    SessionStatus, StepId, StepIndex, WizardSession,
};

/// Step 1 draft: `{onderwerp: "fietsparkeren", overheidslaag: "gemeente"}`
pub fn fietsparkeren_draft() -> LocalDraft {
    LocalDraft {
        step: StepIndex(1),
        onderwerp: "fietsparkeren".into(),
        overheidslaag: Some("gemeente".into()),
        timestamp: Utc::now(),
        ..LocalDraft::default()
    }
}

pub fn context(entries: &[(&str, Value)]) -> SessionContext {
    entries
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

pub fn session(id: &str, step: &str, revision: u64, ctx: SessionContext) -> WizardSession {
    WizardSession {
        session_id: SessionId::new(id),
        wizard_definition_id: crate::server::DEFINITION_ID.into(),
        wizard_definition_version: 1,
        current_step_id: StepId::from(step),
        revision: Revision(revision),
        status: SessionStatus::Active,
        context: ctx,
        updated_at: Utc::now(),
    }
}

pub fn session_updated_at(mut session: WizardSession, at: DateTime<Utc>) -> WizardSession {
    session.updated_at = at;
    session
}

pub fn progress(run: &str, status: ScanStatus, percent: u8, found: u32) -> ScanProgress {
    ScanProgress {
        run_id: RunId::new(run),
        status,
        progress: percent,
        documents_found: found,
        current_step: None,
        error: None,
    }
}

/// `n` documents as the listing endpoint returns them
pub fn documents_json(prefix: &str, n: usize) -> Value {
    Value::Array(
        (0..n)
            .map(|i| {
                json!({
                    "_id": format!("{prefix}-{i}"),
                    "url": format!("https://example.nl/{prefix}/{i}.pdf"),
                    "titel": format!("Document {i}"),
                })
            })
            .collect(),
    )
}

pub fn document(id: &str) -> Document {
    Document {
        id: id.into(),
        url: format!("https://example.nl/{id}.pdf"),
        title: id.into(),
        website_url: None,
        document_type: None,
        published_at: None,
        review_status: wizsync_model::ReviewStatus::Pending,
    }
}
