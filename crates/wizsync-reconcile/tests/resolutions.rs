//! Reconciliation on reattach, end to end against the in-memory server

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;
use wizsync_draft::{DraftStore, DraftStoreConfig, MemoryStore};
use wizsync_model::{fields, LocalDraft, SessionId, SessionStateCodec, StepIndex};
use wizsync_reconcile::{detect, ConflictResolution, ReconciliationEngine};
use wizsync_session::WizardSessionClient;
use wizsync_test_utils::fixtures::{context, fietsparkeren_draft, session};
use wizsync_test_utils::{MockSessionServer, DEFINITION_ID};

struct Harness {
    server: Arc<MockSessionServer>,
    drafts: DraftStore,
    engine: ReconciliationEngine,
    session_id: SessionId,
}

/// Draft says gemeente, server says provincie
async fn harness() -> Harness {
    harness_with(&[
        (fields::ONDERWERP, "fietsparkeren"),
        (fields::OVERHEIDSLAAG, "provincie"),
    ])
    .await
}

/// The fietsparkeren draft is saved first, then the server context gets
/// `server_fields`
async fn harness_with(server_fields: &[(&str, &str)]) -> Harness {
    let server = Arc::new(MockSessionServer::new());
    let client = Arc::new(WizardSessionClient::new(server.clone()));
    let session_id = client.create_session(DEFINITION_ID, None).await.unwrap();

    let ui = Arc::new(Mutex::new(fietsparkeren_draft()));
    let snapshot = Arc::clone(&ui);
    let drafts = DraftStore::new(
        Arc::new(MemoryStore::new()),
        DraftStoreConfig::default(),
        move || snapshot.lock().clone(),
    );
    drafts.save_draft_sync();

    for (key, value) in server_fields {
        server.set_context(&session_id, key, *value);
    }

    let engine = ReconciliationEngine::new(client, drafts.clone(), SessionStateCodec::default());
    Harness {
        server,
        drafts,
        engine,
        session_id,
    }
}

#[tokio::test]
async fn fietsparkeren_layer_conflict_is_detected() {
    let h = harness().await;
    let verdict = h.engine.attach(h.drafts.check_for_restore()).await;

    assert!(verdict.has_conflict);
    assert_eq!(
        verdict.divergent_fields.iter().cloned().collect::<Vec<_>>(),
        vec![fields::OVERHEIDSLAAG.to_string()]
    );
    assert_eq!(verdict.server_state.map(|s| s.revision), h.server.revision(&h.session_id));
    assert!(h.engine.has_conflict());
}

#[tokio::test]
async fn server_holding_only_the_layer() {
    let h = harness_with(&[(fields::OVERHEIDSLAAG, "provincie")]).await;
    let verdict = h.engine.attach(h.drafts.check_for_restore()).await;
    assert!(verdict.has_conflict);
    assert_eq!(
        verdict.divergent_fields.iter().cloned().collect::<Vec<_>>(),
        vec![fields::OVERHEIDSLAAG.to_string()]
    );

    let server = h.engine.use_server_state().unwrap();
    assert_eq!(server.draft.overheidslaag.as_deref(), Some("provincie"));
    assert_eq!(server.draft.onderwerp, "");
    assert!(!h.engine.has_conflict());

    let h = harness_with(&[(fields::OVERHEIDSLAAG, "provincie")]).await;
    h.engine.attach(h.drafts.check_for_restore()).await;
    let client = h.engine.use_client_draft().unwrap();
    assert_eq!(client.draft.overheidslaag.as_deref(), Some("gemeente"));
    assert_eq!(client.draft.onderwerp, "fietsparkeren");
    assert!(!h.engine.has_conflict());
}

#[tokio::test]
async fn every_resolution_leaves_nothing_pending() {
    for resolution in [
        ConflictResolution::UseClientDraft,
        ConflictResolution::UseServerState,
        ConflictResolution::MergeDrafts,
        ConflictResolution::IgnoreConflict,
    ] {
        let h = harness().await;
        let verdict = h.engine.attach(h.drafts.check_for_restore()).await;
        assert!(verdict.has_conflict, "{resolution}");

        let resolved = h.engine.resolve(resolution).await.unwrap();
        assert_eq!(resolved.resolution, resolution);

        let expected_layer = match resolution {
            ConflictResolution::UseClientDraft => "gemeente",
            _ => "provincie",
        };
        assert_eq!(resolved.draft.overheidslaag.as_deref(), Some(expected_layer), "{resolution}");
        assert_eq!(resolved.draft.onderwerp, "fietsparkeren", "{resolution}");

        assert!(!h.engine.has_conflict(), "{resolution}");
        assert!(!h.drafts.has_pending_restore(), "{resolution}");
        assert!(h.drafts.load_draft().is_none(), "{resolution}");

        let again = h.engine.attach(h.drafts.check_for_restore()).await;
        assert!(!again.has_conflict, "{resolution}");
    }
}

#[tokio::test]
async fn merge_takes_step_from_server() {
    let h = harness().await;
    let mut local = fietsparkeren_draft();
    local.step = StepIndex(2);
    h.engine.attach(Some(local)).await;

    let merged = h.engine.merge_drafts().unwrap();
    assert_eq!(merged.draft.step, StepIndex::FIRST);
    assert_eq!(merged.draft.overheidslaag.as_deref(), Some("provincie"));
}

#[tokio::test]
async fn resolutions_without_conflict_report_nothing() {
    let h = harness().await;
    assert!(h.engine.use_client_draft().is_none());
    assert!(h.engine.use_server_state().is_none());
    assert!(h.engine.merge_drafts().is_none());
}

#[tokio::test]
async fn ignore_when_server_unreachable_lands_on_first_step() {
    let h = harness().await;
    h.engine.attach(h.drafts.check_for_restore()).await;
    h.server.set_unreachable(true);

    let resolved = h.engine.ignore_conflict().await;
    assert_eq!(resolved.resolution, ConflictResolution::IgnoreConflict);
    assert_eq!(resolved.draft, LocalDraft::at_step(StepIndex::FIRST));
    assert!(resolved.server_state.is_none());
    assert!(!h.engine.has_conflict());
    assert!(h.drafts.load_draft().is_none());
}

#[tokio::test]
async fn unreachable_server_on_attach_is_not_a_conflict() {
    let h = harness().await;
    h.server.set_unreachable(true);
    let verdict = h.engine.attach(h.drafts.check_for_restore()).await;
    assert!(!verdict.has_conflict);
    assert!(verdict.client_draft.is_some());
}

proptest! {
    #[test]
    fn prop_conflict_iff_a_field_differs(
        local_topic in "[a-z]{1,8}",
        server_topic in "[a-z]{1,8}",
        local_layer in prop::option::of("gemeente|provincie|rijk"),
        server_layer in prop::option::of("gemeente|provincie|rijk"),
    ) {
        let draft = LocalDraft {
            step: StepIndex(1),
            onderwerp: local_topic.clone(),
            overheidslaag: local_layer.clone(),
            ..LocalDraft::default()
        };
        let mut entries = vec![(fields::ONDERWERP, serde_json::Value::from(server_topic.clone()))];
        if let Some(layer) = &server_layer {
            entries.push((fields::OVERHEIDSLAAG, serde_json::Value::from(layer.clone())));
        }
        let server = session("s-1", "query-configuration", 3, context(&entries));

        let verdict = detect(&SessionStateCodec::default(), Some(draft), Some(server));
        let differs = local_topic != server_topic
            || (server_layer.is_some() && local_layer != server_layer);
        prop_assert_eq!(verdict.has_conflict, differs);
    }
}
