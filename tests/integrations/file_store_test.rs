//! Integration tests running sessions over the file snapshot store

use formflow_core::domain::timer::memory::ManualTimerService;
use formflow_core::{FormSession, PersistedSnapshot, SnapshotStore, SubmissionOutcome};
use formflow_state_file::FileSnapshotStore;
use formflow_test_utils::fixtures::three_step_form;
use formflow_test_utils::init_test_logging;
use formflow_test_utils::recorders::RecordingSubmitHandler;
use formflow_tests::{persisted_config, STORAGE_KEY};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

async fn session_over(dir: &Path, submit: Arc<RecordingSubmitHandler>) -> FormSession {
    let store = FileSnapshotStore::open(dir).await.unwrap();
    FormSession::builder(three_step_form())
        .with_config(persisted_config())
        .with_submit_handler(submit)
        .with_snapshot_store(Arc::new(store))
        .with_timer_service(Arc::new(ManualTimerService::new()))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_progress_survives_restart() -> anyhow::Result<()> {
    init_test_logging();
    let dir = tempfile::tempdir()?;
    let submit = Arc::new(RecordingSubmitHandler::new());

    let first = session_over(dir.path(), submit.clone()).await;
    assert!(!first.start().await?);
    first
        .set_field_value("account.email", json!("ada@example.com"))
        .await?;
    assert!(first.next().await?.moved());
    first.teardown().await;

    let store = FileSnapshotStore::open(dir.path()).await?;
    let raw = store.get(STORAGE_KEY).await?.expect("snapshot file");
    assert_eq!(PersistedSnapshot::from_json(&raw)?.body.current_step_index, 1);

    let second = session_over(dir.path(), submit.clone()).await;
    assert!(second.start().await?);
    assert_eq!(second.current_step_index().await, 1);
    assert_eq!(
        second.data().await.get("account.email"),
        Some(&json!("ada@example.com"))
    );

    second.skip().await?;
    second.set_field_value("confirm.terms", json!(true)).await?;
    second
        .set_field_value("confirm.signature", json!("Ada"))
        .await?;
    assert_eq!(second.submit().await?, SubmissionOutcome::Submitted);

    assert!(!store.path_for(STORAGE_KEY).exists());
    assert_eq!(submit.call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_corrupt_file_is_discarded() -> anyhow::Result<()> {
    init_test_logging();
    let dir = tempfile::tempdir()?;
    let store = FileSnapshotStore::open(dir.path()).await?;
    store.set(STORAGE_KEY, "{\"data\": 42".to_string()).await?;

    let session = session_over(dir.path(), Arc::new(RecordingSubmitHandler::new())).await;
    assert!(!session.start().await?);
    assert!(!store.path_for(STORAGE_KEY).exists());
    Ok(())
}
