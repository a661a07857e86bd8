//! Integration tests for autosave and resume
//!
//! All timing runs on the manual clock; nothing here sleeps.

use formflow_core::{
    AutoSaveStatus, PersistedSnapshot, SaveOutcome, SnapshotBody, StepId, TimerKind, WorkingData,
};
use formflow_test_utils::assertions::{assert_completed, assert_current_step};
use formflow_test_utils::fixtures::{conditional_form, three_step_form};
use formflow_test_utils::{init_test_logging, SessionHarness};
use formflow_tests::{persisted_config, STORAGE_KEY};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::BTreeSet;

async fn started() -> SessionHarness {
    init_test_logging();
    SessionHarness::started(three_step_form(), persisted_config())
        .await
        .unwrap()
}

fn stored(harness: &SessionHarness) -> PersistedSnapshot {
    let raw = harness.store.raw(STORAGE_KEY).expect("snapshot should exist");
    PersistedSnapshot::from_json(&raw).unwrap()
}

#[tokio::test]
async fn test_debounce_coalesces_rapid_edits() {
    let harness = started().await;

    for (value, pause) in [("a@example.com", 500), ("b@example.com", 500), ("c@example.com", 1999)] {
        harness
            .session
            .set_field_value("account.email", json!(value))
            .await
            .unwrap();
        let report = harness.advance_millis(pause).await;
        assert!(report.saves.is_empty());
    }
    assert_eq!(harness.timers.pending_of(TimerKind::Debounce), 1);

    let report = harness.advance_millis(1).await;
    assert_eq!(report.saves, vec![SaveOutcome::Saved]);

    assert_eq!(harness.store.write_count(), 1);
    assert_eq!(
        harness.auto_save.calls(),
        vec![json!({"account": {"email": "c@example.com"}})]
    );
    assert_eq!(
        stored(&harness).body.data.get("account.email"),
        Some(&json!("c@example.com"))
    );
}

#[tokio::test]
async fn test_saved_status_returns_to_idle() {
    let harness = started().await;
    harness
        .session
        .set_field_value("account.email", json!("ada@example.com"))
        .await
        .unwrap();

    harness.advance_millis(2000).await;
    assert_eq!(harness.session.auto_save_status().await, AutoSaveStatus::Saved);

    harness.advance_millis(2999).await;
    assert_eq!(harness.session.auto_save_status().await, AutoSaveStatus::Saved);

    harness.advance_millis(1).await;
    assert_eq!(harness.session.auto_save_status().await, AutoSaveStatus::Idle);
}

#[tokio::test]
async fn test_periodic_save_skips_unchanged_data() {
    let harness = started().await;
    harness
        .session
        .set_field_value("account.email", json!("ada@example.com"))
        .await
        .unwrap();
    harness.advance_millis(2000).await;
    assert_eq!(harness.store.write_count(), 1);

    // Clean data: the periodic tick at 30s does nothing.
    let report = harness.advance_millis(28_000).await;
    assert!(report.fired.iter().any(|e| e.kind == TimerKind::Periodic));
    assert!(report.saves.is_empty());

    // Writing the same value again makes the data dirty but not different.
    harness
        .session
        .set_field_value("account.email", json!("ada@example.com"))
        .await
        .unwrap();
    let report = harness.advance_millis(2000).await;
    assert_eq!(report.saves, vec![SaveOutcome::Skipped]);
    assert_eq!(harness.store.write_count(), 1);
    assert_eq!(harness.auto_save.call_count(), 1);
}

#[tokio::test]
async fn test_periodic_save_writes_dirty_data() {
    let mut config = persisted_config();
    config.auto_save.delay_ms = 60_000;
    let harness = SessionHarness::started(three_step_form(), config).await.unwrap();

    harness
        .session
        .set_field_value("account.email", json!("ada@example.com"))
        .await
        .unwrap();
    let report = harness.advance_millis(30_000).await;
    assert_eq!(report.saves, vec![SaveOutcome::Saved]);

    // The pending debounce finds nothing new.
    let report = harness.advance_millis(30_000).await;
    assert!(report.saves.iter().all(|outcome| *outcome == SaveOutcome::Skipped));
    assert_eq!(harness.store.write_count(), 1);
}

#[tokio::test]
async fn test_step_change_saves_immediately() {
    let harness = started().await;
    harness
        .session
        .set_field_value("account.email", json!("ada@example.com"))
        .await
        .unwrap();
    harness.session.next().await.unwrap();

    assert_eq!(harness.store.write_count(), 1);
    let snapshot = stored(&harness);
    assert_eq!(snapshot.body.current_step_index, 1);
    assert_eq!(
        snapshot.body.completed_steps,
        BTreeSet::from([StepId::from("a")])
    );

    let report = harness.advance_millis(2000).await;
    assert_eq!(report.saves, vec![SaveOutcome::Skipped]);
}

#[tokio::test]
async fn test_failed_save_reports_error_and_retries() {
    let harness = started().await;
    harness.store.fail_writes(true);
    harness
        .session
        .set_field_value("account.email", json!("ada@example.com"))
        .await
        .unwrap();

    let report = harness.advance_millis(2000).await;
    assert!(matches!(report.saves.as_slice(), [SaveOutcome::Failed(_)]));
    assert_eq!(harness.session.auto_save_status().await, AutoSaveStatus::Error);
    assert_eq!(harness.events.count("autosave.failed"), 1);
    // The callback is still attempted when the store write fails.
    assert_eq!(harness.auto_save.call_count(), 1);

    harness.advance_millis(5000).await;
    assert_eq!(harness.session.auto_save_status().await, AutoSaveStatus::Idle);

    // Still dirty, so the next periodic tick tries again.
    harness.store.fail_writes(false);
    let report = harness.advance_millis(23_000).await;
    assert_eq!(report.saves, vec![SaveOutcome::Saved]);
    assert!(harness.store.contains(STORAGE_KEY));
}

#[tokio::test]
async fn test_failing_callback_keeps_store_write() {
    let harness = started().await;
    harness.auto_save.set_failing(true);
    harness
        .session
        .set_field_value("account.email", json!("ada@example.com"))
        .await
        .unwrap();

    let report = harness.advance_millis(2000).await;
    assert!(matches!(report.saves.as_slice(), [SaveOutcome::Failed(_)]));
    assert_eq!(harness.store.write_count(), 1);
}

#[tokio::test]
async fn test_resume_round_trip() {
    init_test_logging();
    let first = SessionHarness::started(conditional_form(), persisted_config())
        .await
        .unwrap();
    first.session.set_field_value("plan", json!("pro")).await.unwrap();
    first.session.next().await.unwrap();
    first.session.set_field_value("seats", json!(12)).await.unwrap();
    first.advance_millis(2000).await;
    first.session.teardown().await;

    let second =
        SessionHarness::with_store(conditional_form(), persisted_config(), first.store.clone())
            .unwrap();
    assert!(second.session.start().await.unwrap());

    let view = second.session.view().await;
    assert_current_step(&view, 1, "seats").unwrap();
    assert_completed(&view, &["plan"]).unwrap();
    assert_eq!(view.data.get("seats"), Some(&json!(12)));
    assert_eq!(second.events.event_types().first(), Some(&"session.started"));
}

#[tokio::test]
async fn test_resume_clamps_to_visible_steps() {
    init_test_logging();
    let harness = SessionHarness::with_config(conditional_form(), persisted_config()).unwrap();
    let snapshot = PersistedSnapshot::new(SnapshotBody {
        data: WorkingData::from_value(json!({"plan": "basic"})).unwrap(),
        current_step_index: 2,
        completed_steps: BTreeSet::from([
            StepId::from("plan"),
            StepId::from("seats"),
            StepId::from("retired-step"),
        ]),
    });
    harness.store.seed(STORAGE_KEY, snapshot.to_json().unwrap());

    assert!(harness.session.start().await.unwrap());

    let view = harness.session.view().await;
    assert_eq!(
        view.visible_steps,
        vec![StepId::from("plan"), StepId::from("done")]
    );
    assert_current_step(&view, 1, "done").unwrap();
    assert_completed(&view, &["plan", "seats"]).unwrap();
}

#[tokio::test]
async fn test_unreadable_snapshot_is_discarded() {
    init_test_logging();
    let harness = SessionHarness::with_config(three_step_form(), persisted_config()).unwrap();
    harness.store.seed(STORAGE_KEY, "{not json");

    assert!(!harness.session.start().await.unwrap());
    assert!(!harness.store.contains(STORAGE_KEY));
    assert_current_step(&harness.session.view().await, 0, "a").unwrap();
}

#[tokio::test]
async fn test_expired_snapshot_is_discarded() {
    init_test_logging();
    let mut config = persisted_config();
    config.snapshot_max_age_secs = Some(3600);
    let harness = SessionHarness::with_config(three_step_form(), config).unwrap();
    let old = json!({
        "data": {"account": {"email": "old@example.com"}},
        "currentStepIndex": 1,
        "completedSteps": ["a"],
        "timestamp": "2020-01-01T00:00:00Z"
    });
    harness.store.seed(STORAGE_KEY, old.to_string());

    assert!(!harness.session.start().await.unwrap());
    assert!(!harness.store.contains(STORAGE_KEY));
    assert!(harness.session.data().await.is_empty());
}

#[tokio::test]
async fn test_disabled_autosave_still_saves_on_step_change() {
    let mut config = persisted_config();
    config.auto_save.enabled = false;
    let harness = SessionHarness::started(three_step_form(), config).await.unwrap();

    assert_eq!(harness.timers.pending(), 0);
    harness
        .session
        .set_field_value("account.email", json!("ada@example.com"))
        .await
        .unwrap();
    assert_eq!(harness.timers.pending(), 0);

    harness.session.next().await.unwrap();
    assert_eq!(harness.store.write_count(), 1);
}

#[tokio::test]
async fn test_timers_ignored_after_teardown() {
    let harness = started().await;
    harness
        .session
        .set_field_value("account.email", json!("ada@example.com"))
        .await
        .unwrap();
    harness.session.teardown().await;

    assert_eq!(harness.timers.pending(), 0);
    let report = harness.advance_millis(60_000).await;
    assert!(report.fired.is_empty());
    assert_eq!(harness.store.write_count(), 0);
}

#[tokio::test]
async fn test_rejecting_store_reports_failure() {
    use formflow_core::domain::timer::memory::ManualTimerService;
    use formflow_core::{CoreError, FormSession};
    use formflow_test_utils::mocks::{accepting_submit_handler, MockSnapshotStore};
    use std::sync::Arc;

    init_test_logging();
    let mut store = MockSnapshotStore::new();
    store.expect_get().times(1).returning(|_| Ok(None));
    store
        .expect_set()
        .returning(|_, _| Err(CoreError::StateStoreError("quota exceeded".to_string())));

    let session = FormSession::builder(three_step_form())
        .with_config(persisted_config())
        .with_submit_handler(Arc::new(accepting_submit_handler()))
        .with_snapshot_store(Arc::new(store))
        .with_timer_service(Arc::new(ManualTimerService::new()))
        .build()
        .unwrap();
    assert!(!session.start().await.unwrap());
    session
        .set_field_value("account.email", json!("ada@example.com"))
        .await
        .unwrap();

    match session.save_now().await.unwrap() {
        SaveOutcome::Failed(errors) => {
            assert!(errors.iter().any(|e| e.contains("quota exceeded")));
        }
        other => panic!("Expected a failed save, got {:?}", other),
    }
    assert_eq!(session.auto_save_status().await, AutoSaveStatus::Error);
}
