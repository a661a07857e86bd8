//! Integration tests for autosave on the tokio timer service
//!
//! The runtime clock is paused, so sleeps advance virtual time instantly.

use formflow_core::domain::repository::memory::MemorySnapshotStore;
use formflow_core::{AutoSaveStatus, FormSession, TokioTimerService};
use formflow_test_utils::init_test_logging;
use formflow_test_utils::fixtures::three_step_form;
use formflow_test_utils::recorders::RecordingSubmitHandler;
use formflow_tests::{persisted_config, STORAGE_KEY};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn session(store: &MemorySnapshotStore, timers: TokioTimerService) -> Arc<FormSession> {
    Arc::new(
        FormSession::builder(three_step_form())
            .with_config(persisted_config())
            .with_submit_handler(Arc::new(RecordingSubmitHandler::new()))
            .with_snapshot_store(Arc::new(store.clone()))
            .with_timer_service(Arc::new(timers))
            .build()
            .unwrap(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_debounced_save_on_tokio_timers() {
    init_test_logging();
    let store = MemorySnapshotStore::new();
    let (timers, timer_events) = TokioTimerService::new();
    let session = session(&store, timers);
    session.start().await.unwrap();

    let runner = tokio::spawn({
        let session = session.clone();
        async move { session.run_timers(timer_events).await }
    });

    session
        .set_field_value("account.email", json!("a@example.com"))
        .await
        .unwrap();
    sleep(Duration::from_millis(1000)).await;
    session
        .set_field_value("account.email", json!("b@example.com"))
        .await
        .unwrap();

    sleep(Duration::from_millis(1500)).await;
    assert_eq!(store.write_count(), 0);

    sleep(Duration::from_millis(600)).await;
    assert_eq!(store.write_count(), 1);
    assert!(store.raw(STORAGE_KEY).unwrap().contains("b@example.com"));
    assert_eq!(session.auto_save_status().await, AutoSaveStatus::Saved);

    sleep(Duration::from_secs(3)).await;
    assert_eq!(session.auto_save_status().await, AutoSaveStatus::Idle);

    // Periodic ticks on clean data do not write.
    sleep(Duration::from_secs(60)).await;
    assert_eq!(store.write_count(), 1);

    session.teardown().await;
    runner.abort();
}
