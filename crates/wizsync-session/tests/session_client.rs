//! Session client against the in-memory server

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use wizsync_model::steps::{DOCUMENT_REVIEW, QUERY_CONFIGURATION, WEBSITE_SELECTION};
use wizsync_model::{fields, ActionId, Revision, SessionStatus, StepId};
use wizsync_session::{
    ClientPhase, PhaseKind, RevisionConflictRetrier, SessionError, WizardSessionClient,
};
use wizsync_test_utils::{MockSessionServer, CREATE_QUERY, DEFINITION_ID, START_SCAN};

fn setup() -> (Arc<MockSessionServer>, WizardSessionClient) {
    let server = Arc::new(MockSessionServer::new());
    let client = WizardSessionClient::new(server.clone());
    (server, client)
}

fn step(id: &str) -> StepId {
    StepId::from(id)
}

#[tokio::test]
async fn full_wizard_flow_reaches_completion() {
    let (server, client) = setup();
    let sid = client.create_session(DEFINITION_ID, None).await.unwrap();
    assert_eq!(server.revision(&sid), Some(Revision(0)));

    let out = client
        .execute_action(
            &step(QUERY_CONFIGURATION),
            &ActionId::from(CREATE_QUERY),
            &json!({"onderwerp": "fietsparkeren", "overheidslaag": "gemeente"}),
            None,
        )
        .await
        .unwrap();
    assert!(out["queryId"].as_str().is_some());

    client.navigate(&step(WEBSITE_SELECTION)).await.unwrap();
    client
        .execute_action(
            &step(WEBSITE_SELECTION),
            &ActionId::from(START_SCAN),
            &json!({"selectedWebsites": ["https://www.utrecht.nl"]}),
            None,
        )
        .await
        .unwrap();
    client.navigate(&step(DOCUMENT_REVIEW)).await.unwrap();
    let done = client
        .mark_step_completed(&step(DOCUMENT_REVIEW), &json!({"approved": 3}))
        .await
        .unwrap();

    assert_eq!(done.status, SessionStatus::Completed);
    assert_eq!(client.phase().kind(), PhaseKind::Completed);
    let result = client.get_result().await.unwrap();
    assert_eq!(result.summary[fields::ONDERWERP], json!("fietsparkeren"));
}

#[tokio::test]
async fn create_with_unknown_definition_fails() {
    let (_, client) = setup();
    let err = client.create_session("onbekend", None).await.unwrap_err();
    assert!(matches!(err, SessionError::Create(_)));
    assert_eq!(client.phase(), ClientPhase::Uninitialized);
}

#[tokio::test]
async fn create_when_unreachable_fails() {
    let (server, client) = setup();
    server.set_unreachable(true);
    let err = client.create_session(DEFINITION_ID, None).await.unwrap_err();
    assert!(matches!(err, SessionError::Create(_)));
}

#[tokio::test]
async fn prerequisite_failure_is_not_retried() {
    let (server, client) = setup();
    client.create_session(DEFINITION_ID, None).await.unwrap();

    let err = client.navigate(&step(DOCUMENT_REVIEW)).await.unwrap_err();
    let failure = err.prerequisite().cloned().unwrap();
    assert_eq!(failure.step, step(DOCUMENT_REVIEW));
    assert!(failure.missing.contains(&fields::QUERY_ID.to_string()));
    assert!(!failure.suggestion.is_empty());
    assert_eq!(server.calls("navigate"), 1);
    assert_eq!(client.revision(), Some(Revision(0)));
}

#[tokio::test]
async fn conflict_from_concurrent_writer_is_absorbed() {
    let (server, client) = setup();
    let sid = client.create_session(DEFINITION_ID, None).await.unwrap();
    server.bump_revision(&sid);

    client
        .execute_action(
            &step(QUERY_CONFIGURATION),
            &ActionId::from(CREATE_QUERY),
            &json!({"onderwerp": "geluid"}),
            None,
        )
        .await
        .unwrap();

    assert_eq!(server.calls("execute_action"), 2);
    assert_eq!(client.revision(), server.revision(&sid));
    assert_eq!(client.revision(), Some(Revision(2)));
}

#[tokio::test]
async fn contention_beyond_cap_surfaces_conflict() {
    let (server, client) = setup();
    client.create_session(DEFINITION_ID, None).await.unwrap();
    server.inject_contention(5);

    let err = client
        .execute_action(
            &step(QUERY_CONFIGURATION),
            &ActionId::from(CREATE_QUERY),
            &json!({"onderwerp": "geluid"}),
            None,
        )
        .await
        .unwrap_err();

    assert!(err.is_revision_conflict());
    assert_eq!(server.calls("execute_action"), 3);
}

#[tokio::test]
async fn explicit_stale_revision_is_corrected() {
    let (server, client) = setup();
    let sid = client.create_session(DEFINITION_ID, None).await.unwrap();

    client
        .execute_action(
            &step(QUERY_CONFIGURATION),
            &ActionId::from(CREATE_QUERY),
            &json!({"onderwerp": "geluid"}),
            Some(Revision(40)),
        )
        .await
        .unwrap();
    assert_eq!(server.revision(&sid), Some(Revision(1)));
}

#[tokio::test]
async fn validation_fails_closed_when_unreachable() {
    let (server, client) = setup();
    client.create_session(DEFINITION_ID, None).await.unwrap();

    let input = json!({"onderwerp": "fietsparkeren"});
    assert!(client.validate_input(&step(QUERY_CONFIGURATION), &input).await);
    assert!(!client.validate_input(&step(QUERY_CONFIGURATION), &json!({})).await);

    server.set_unreachable(true);
    assert!(!client.validate_input(&step(QUERY_CONFIGURATION), &input).await);
}

#[tokio::test]
async fn mutations_outside_active_are_invalid() {
    let (_, client) = setup();
    let err = client
        .execute_action(&step(QUERY_CONFIGURATION), &ActionId::from(CREATE_QUERY), &json!({}), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::InvalidState {
            phase: PhaseKind::Uninitialized,
            ..
        }
    ));
    assert!(matches!(
        client.get_state().await,
        Err(SessionError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn resume_attaches_to_existing_session() {
    let (server, first) = setup();
    let sid = first.create_session(DEFINITION_ID, None).await.unwrap();
    server.set_context(&sid, fields::ONDERWERP, "fietsparkeren");

    let second = WizardSessionClient::new(server.clone());
    let session = second.resume(&sid).await.unwrap();
    assert_eq!(session.revision, Revision(1));
    assert_eq!(second.session_id(), Some(sid));
    assert_eq!(second.phase().kind(), PhaseKind::Active);

    let missing = second.resume(&"geen-sessie".into()).await.unwrap_err();
    assert!(matches!(missing, SessionError::NotFound(_)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_revision_strictly_increases(ops in prop::collection::vec(0u8..3, 1..12), writers in prop::collection::vec(any::<bool>(), 12)) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let server = Arc::new(MockSessionServer::new());
            let client = WizardSessionClient::new(server.clone())
                .with_retrier(RevisionConflictRetrier::new(3));
            let sid = client.create_session(DEFINITION_ID, None).await.unwrap();
            let mut last = server.revision(&sid).unwrap();

            for (i, op) in ops.iter().enumerate() {
                if writers[i] {
                    server.bump_revision(&sid);
                }
                let result = match op {
                    0 => client
                        .execute_action(
                            &step(QUERY_CONFIGURATION),
                            &ActionId::from(CREATE_QUERY),
                            &json!({"onderwerp": "geluid"}),
                            None,
                        )
                        .await
                        .map(|_| ()),
                    1 => client.navigate(&step(QUERY_CONFIGURATION)).await.map(|_| ()),
                    _ => client
                        .mark_step_completed(&step(QUERY_CONFIGURATION), &json!({}))
                        .await
                        .map(|_| ()),
                };
                prop_assert!(result.is_ok());

                let now = server.revision(&sid).unwrap();
                prop_assert!(now > last);
                prop_assert_eq!(client.revision(), Some(now));
                last = now;
            }
            Ok(())
        })?;
    }
}
