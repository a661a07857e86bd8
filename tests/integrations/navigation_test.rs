//! Integration tests for step navigation
//!
//! Forward moves are gated by validation of the step being left; backward
//! moves never are.

use formflow_core::{CoreError, FormConfig, FormStatus, Navigation, StepId};
use formflow_test_utils::assertions::{
    assert_completed, assert_current_step, assert_errors_only_for, assert_skipped,
};
use formflow_test_utils::fixtures::three_step_form;
use formflow_test_utils::{init_test_logging, SessionHarness};
use serde_json::json;

async fn started() -> SessionHarness {
    init_test_logging();
    SessionHarness::started(three_step_form(), FormConfig::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_edits_require_started_session() {
    let harness = SessionHarness::new(three_step_form()).unwrap();

    let err = harness
        .session
        .set_field_value("account.email", json!("ada@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidTransition(_)));

    assert!(!harness.session.start().await.unwrap());
    assert_eq!(harness.session.status().await, FormStatus::InProgress);
    assert!(harness.session.start().await.is_err());
}

#[tokio::test]
async fn test_forward_blocked_by_invalid_step() {
    let harness = started().await;

    let navigation = harness.session.next().await.unwrap();
    match navigation {
        Navigation::Blocked { step_id, errors } => {
            assert_eq!(step_id, StepId::from("a"));
            assert!(errors.contains_key("account.email"));
        }
        other => panic!("Expected a blocked move, got {:?}", other),
    }

    let view = harness.session.view().await;
    assert_current_step(&view, 0, "a").unwrap();
    assert_errors_only_for(&view, &["account.email"]).unwrap();
    assert_eq!(harness.events.count("step.validation_failed"), 1);
    assert!(harness.steps.changes().is_empty());

    // Editing the field clears its displayed error.
    harness
        .session
        .set_field_value("account.email", json!("ada@example.com"))
        .await
        .unwrap();
    assert!(harness.session.errors().await.is_empty());
}

#[tokio::test]
async fn test_backward_moves_never_validate() {
    let harness = started().await;
    harness
        .session
        .set_field_value("account.email", json!("ada@example.com"))
        .await
        .unwrap();
    assert!(harness.session.next().await.unwrap().moved());
    assert!(harness.session.skip().await.unwrap().moved());

    // Invalidate step `a` behind us, then walk back over it.
    harness
        .session
        .set_field_value("account.email", json!(""))
        .await
        .unwrap();
    assert_eq!(
        harness.session.go_to_step(0).await.unwrap(),
        Navigation::Moved { from: 2, to: 0 }
    );
    assert!(harness.session.errors().await.is_empty());

    let changes: Vec<usize> = harness
        .steps
        .changes()
        .into_iter()
        .map(|(index, _)| index)
        .collect();
    assert_eq!(changes, vec![1, 2, 0]);
}

#[tokio::test]
async fn test_optional_step_passes_when_invalid() {
    let harness = started().await;
    harness
        .session
        .set_field_value("account.email", json!("ada@example.com"))
        .await
        .unwrap();
    harness.session.next().await.unwrap();

    // `b` is optional: an empty bio does not block.
    let navigation = harness.session.next().await.unwrap();
    assert_eq!(navigation, Navigation::Moved { from: 1, to: 2 });

    let view = harness.session.view().await;
    assert_completed(&view, &["a", "b"]).unwrap();
    assert_skipped(&view, &["b"]).unwrap();

    // Filling it in later turns the skip into a completion.
    harness.session.previous().await.unwrap();
    harness
        .session
        .set_field_value("profile.bio", json!("Mathematician"))
        .await
        .unwrap();
    harness.session.next().await.unwrap();

    let view = harness.session.view().await;
    assert_completed(&view, &["a", "b"]).unwrap();
    assert_skipped(&view, &[]).unwrap();
}

#[tokio::test]
async fn test_navigation_bounds() {
    let harness = started().await;

    assert!(matches!(
        harness.session.previous().await,
        Err(CoreError::InvalidTransition(_))
    ));
    assert!(matches!(
        harness.session.go_to_step(3).await,
        Err(CoreError::StepOutOfRange { index: 3, visible: 3 })
    ));
    assert_eq!(
        harness.session.go_to_step(0).await.unwrap(),
        Navigation::Unchanged
    );

    // `a` is required, so it cannot be skipped.
    assert!(matches!(
        harness.session.skip().await,
        Err(CoreError::InvalidTransition(_))
    ));
}

#[tokio::test]
async fn test_last_write_wins() {
    let harness = started().await;

    for value in ["first@example.com", "second@example.com", "third@example.com"] {
        harness
            .session
            .set_field_value("account.email", json!(value))
            .await
            .unwrap();
    }

    let data = harness.session.data().await;
    assert_eq!(data.get("account.email"), Some(&json!("third@example.com")));
    assert_eq!(harness.events.count("field.changed"), 3);
}

#[tokio::test]
async fn test_progress_tracks_completed_steps() {
    let harness = started().await;
    assert_eq!(harness.session.view().await.progress, 0.0);

    harness
        .session
        .set_field_value("account.email", json!("ada@example.com"))
        .await
        .unwrap();
    harness.session.next().await.unwrap();

    let progress = harness.session.view().await.progress;
    assert!((progress - 1.0 / 3.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_reset_returns_to_first_step() {
    let harness = started().await;
    harness
        .session
        .set_field_value("account.email", json!("ada@example.com"))
        .await
        .unwrap();
    harness.session.next().await.unwrap();

    harness.session.reset().await.unwrap();

    let view = harness.session.view().await;
    assert_current_step(&view, 0, "a").unwrap();
    assert_completed(&view, &[]).unwrap();
    assert!(view.data.is_empty());
}

#[tokio::test]
async fn test_teardown_closes_session() {
    let harness = started().await;
    harness.session.teardown().await;

    assert!(harness.session.is_closed().await);
    assert!(matches!(
        harness.session.next().await,
        Err(CoreError::SessionClosed(_))
    ));
}

#[tokio::test]
async fn test_event_handler_failures_are_not_propagated() {
    use formflow_core::domain::timer::memory::ManualTimerService;
    use formflow_core::FormSession;
    use formflow_test_utils::mocks::{accepting_submit_handler, MockFormEventHandler};
    use std::sync::Arc;

    init_test_logging();
    let mut events = MockFormEventHandler::new();
    events
        .expect_handle_event()
        .returning(|_| Err(CoreError::Other("event sink down".to_string())));

    let session = FormSession::builder(three_step_form())
        .with_submit_handler(Arc::new(accepting_submit_handler()))
        .with_event_handler(Arc::new(events))
        .with_timer_service(Arc::new(ManualTimerService::new()))
        .build()
        .unwrap();
    session.start().await.unwrap();

    session
        .set_field_value("account.email", json!("ada@example.com"))
        .await
        .unwrap();
    assert!(session.next().await.unwrap().moved());
}
