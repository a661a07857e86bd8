//! Integration tests for submission
//!
//! Covers the blocked path, the success path that clears the snapshot, the
//! retryable failure path and concurrent submit requests.

use async_trait::async_trait;
use formflow_core::domain::timer::memory::ManualTimerService;
use formflow_core::{
    CoreError, FormEventKind, FormSession, FormStatus, SaveOutcome, StepId, SubmissionOutcome,
    SubmitHandler, SUBMISSION_BLOCKED_MESSAGE,
};
use formflow_test_utils::assertions::{
    assert_completed, assert_current_step, assert_errors_only_for, assert_event_recorded,
    assert_skipped, assert_status,
};
use formflow_test_utils::fixtures::three_step_form;
use formflow_test_utils::{init_test_logging, SessionHarness};
use formflow_tests::{persisted_config, STORAGE_KEY};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Notify;

async fn started() -> SessionHarness {
    init_test_logging();
    SessionHarness::started(three_step_form(), persisted_config())
        .await
        .unwrap()
}

async fn fill_all(harness: &SessionHarness) {
    let session = &harness.session;
    session
        .set_field_value("account.email", json!("ada@example.com"))
        .await
        .unwrap();
    assert!(session.next().await.unwrap().moved());
    assert!(session.skip().await.unwrap().moved());
    session
        .set_field_value("confirm.terms", json!(true))
        .await
        .unwrap();
    session
        .set_field_value("confirm.signature", json!("Ada Lovelace"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_submit_blocked_on_first_invalid_required_step() {
    let harness = started().await;
    harness
        .session
        .set_field_value("account.email", json!("ada@example.com"))
        .await
        .unwrap();
    harness.session.next().await.unwrap();
    harness.session.skip().await.unwrap();

    let outcome = harness.session.submit().await.unwrap();
    match outcome {
        SubmissionOutcome::Blocked {
            step_id,
            step_index,
            errors,
        } => {
            assert_eq!(step_id, StepId::from("c"));
            assert_eq!(step_index, 2);
            assert_eq!(errors.len(), 2);
        }
        other => panic!("Expected a blocked submission, got {:?}", other),
    }

    let view = harness.session.view().await;
    assert_status(&view, FormStatus::InProgress).unwrap();
    assert_current_step(&view, 2, "c").unwrap();
    assert_completed(&view, &["a", "b"]).unwrap();
    assert_skipped(&view, &["b"]).unwrap();
    assert_errors_only_for(&view, &["confirm.signature", "confirm.terms"]).unwrap();
    assert_eq!(harness.submit.call_count(), 0);

    let blocked = harness
        .events
        .events()
        .into_iter()
        .find_map(|event| match event.kind {
            FormEventKind::SubmissionBlocked { message, .. } => Some(message),
            _ => None,
        });
    assert_eq!(blocked.as_deref(), Some(SUBMISSION_BLOCKED_MESSAGE));
}

#[tokio::test]
async fn test_submit_blocked_moves_back_to_invalid_step() {
    let harness = started().await;
    fill_all(&harness).await;

    // Invalidate the first step from the last one.
    harness
        .session
        .set_field_value("account.email", json!("  "))
        .await
        .unwrap();

    let outcome = harness.session.submit().await.unwrap();
    assert!(matches!(outcome, SubmissionOutcome::Blocked { step_index: 0, .. }));

    let view = harness.session.view().await;
    assert_current_step(&view, 0, "a").unwrap();
    assert_errors_only_for(&view, &["account.email"]).unwrap();
    assert_eq!(harness.steps.changes().last(), Some(&(0, StepId::from("a"))));
}

#[tokio::test]
async fn test_successful_submit_clears_snapshot() {
    let harness = started().await;
    fill_all(&harness).await;
    assert!(harness.store.contains(STORAGE_KEY));

    let outcome = harness.session.submit().await.unwrap();
    assert_eq!(outcome, SubmissionOutcome::Submitted);

    assert_eq!(
        harness.submit.calls(),
        vec![json!({
            "account": {"email": "ada@example.com"},
            "confirm": {"terms": true, "signature": "Ada Lovelace"}
        })]
    );
    assert!(!harness.store.contains(STORAGE_KEY));
    assert_eq!(harness.timers.pending(), 0);

    let view = harness.session.view().await;
    assert_status(&view, FormStatus::Completed).unwrap();
    let events = harness.events.events();
    assert_event_recorded(&events, "submission.succeeded").unwrap();
    assert_event_recorded(&events, "snapshot.cleared").unwrap();

    // A second submit is ignored and the form no longer accepts edits.
    assert_eq!(
        harness.session.submit().await.unwrap(),
        SubmissionOutcome::Ignored
    );
    assert_eq!(harness.submit.call_count(), 1);
    assert!(matches!(
        harness
            .session
            .set_field_value("account.email", json!("x@example.com"))
            .await,
        Err(CoreError::InvalidTransition(_))
    ));
}

#[tokio::test]
async fn test_save_after_submit_does_not_restore_snapshot() {
    let harness = started().await;
    fill_all(&harness).await;
    assert_eq!(
        harness.session.submit().await.unwrap(),
        SubmissionOutcome::Submitted
    );
    let writes = harness.store.write_count();

    assert_eq!(harness.session.save_now().await.unwrap(), SaveOutcome::Skipped);
    let report = harness.advance_millis(60_000).await;
    assert!(report.saves.is_empty());

    assert!(!harness.store.contains(STORAGE_KEY));
    assert_eq!(harness.store.write_count(), writes);
}

#[tokio::test]
async fn test_blur_rejected_after_submit() {
    let harness = started().await;
    fill_all(&harness).await;
    harness.session.submit().await.unwrap();

    assert!(matches!(
        harness.session.blur_field("confirm.signature").await,
        Err(CoreError::InvalidTransition(_))
    ));
    assert!(!harness
        .session
        .field_props("confirm.signature")
        .await
        .unwrap()
        .touched);
}

#[tokio::test]
async fn test_failed_submit_keeps_data_for_retry() {
    let harness = started().await;
    fill_all(&harness).await;
    harness.submit.fail_with(Some("server said no"));

    let outcome = harness.session.submit().await.unwrap();
    assert_eq!(
        outcome,
        SubmissionOutcome::Failed {
            error: "server said no".to_string()
        }
    );
    assert_status(&harness.session.view().await, FormStatus::Failed).unwrap();
    assert!(harness.store.contains(STORAGE_KEY));
    assert_eq!(
        harness.session.data().await.get("account.email"),
        Some(&json!("ada@example.com"))
    );

    // Editing after a failure returns to InProgress.
    harness
        .session
        .set_field_value("confirm.signature", json!("A. Lovelace"))
        .await
        .unwrap();
    assert_eq!(harness.session.status().await, FormStatus::InProgress);

    harness.submit.fail_with(None);
    assert_eq!(
        harness.session.submit().await.unwrap(),
        SubmissionOutcome::Submitted
    );
    assert_eq!(harness.submit.call_count(), 2);
}

#[tokio::test]
async fn test_retry_directly_after_failure() {
    let harness = started().await;
    fill_all(&harness).await;
    harness.submit.fail_with(Some("timeout"));
    harness.session.submit().await.unwrap();

    harness.submit.fail_with(None);
    assert_eq!(
        harness.session.submit().await.unwrap(),
        SubmissionOutcome::Submitted
    );
}

/// Holds the submission open until released
struct GatedSubmit {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl SubmitHandler for GatedSubmit {
    async fn on_submit(&self, _data: Value) -> anyhow::Result<()> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }
}

#[tokio::test]
async fn test_concurrent_submit_is_ignored() {
    init_test_logging();
    let gate = Arc::new(GatedSubmit {
        entered: Notify::new(),
        release: Notify::new(),
    });
    let session = Arc::new(
        FormSession::builder(three_step_form())
            .with_submit_handler(gate.clone())
            .with_timer_service(Arc::new(ManualTimerService::new()))
            .build()
            .unwrap(),
    );
    session.start().await.unwrap();
    session
        .set_field_value("account.email", json!("ada@example.com"))
        .await
        .unwrap();
    session.set_field_value("confirm.terms", json!(true)).await.unwrap();
    session
        .set_field_value("confirm.signature", json!("Ada"))
        .await
        .unwrap();

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.submit().await }
    });
    gate.entered.notified().await;

    // The lock is free while the callback runs.
    assert_eq!(session.status().await, FormStatus::Submitting);
    assert_eq!(session.submit().await.unwrap(), SubmissionOutcome::Ignored);

    gate.release.notify_one();
    assert_eq!(first.await.unwrap().unwrap(), SubmissionOutcome::Submitted);
    assert_eq!(session.status().await, FormStatus::Completed);
}
