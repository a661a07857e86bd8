//! `mockall` mocks of the collaborator traits.

use async_trait::async_trait;
use formflow_core::{
    AutoSaveHandler, CoreError, FormEvent, FormEventHandler, SnapshotStore, SubmitHandler,
};
use mockall::mock;
use serde_json::Value;

// Generate the mock implementations
mock! {
    pub SubmitHandler {}

    #[async_trait]
    impl SubmitHandler for SubmitHandler {
        async fn on_submit(&self, data: Value) -> anyhow::Result<()>;
    }
}

mock! {
    pub AutoSaveHandler {}

    #[async_trait]
    impl AutoSaveHandler for AutoSaveHandler {
        async fn on_auto_save(&self, data: Value) -> anyhow::Result<()>;
    }
}

mock! {
    pub FormEventHandler {}

    #[async_trait]
    impl FormEventHandler for FormEventHandler {
        async fn handle_event(&self, event: FormEvent) -> Result<(), CoreError>;
    }
}

mock! {
    pub SnapshotStore {}

    #[async_trait]
    impl SnapshotStore for SnapshotStore {
        async fn get(&self, key: &str) -> Result<Option<String>, CoreError>;
        async fn set(&self, key: &str, record: String) -> Result<(), CoreError>;
        async fn remove(&self, key: &str) -> Result<(), CoreError>;
    }
}

/// Submit handler mock that accepts every submission.
pub fn accepting_submit_handler() -> MockSubmitHandler {
    let mut mock = MockSubmitHandler::new();
    mock.expect_on_submit().returning(|_| Ok(()));
    mock
}

/// Submit handler mock that rejects every submission with `message`.
pub fn rejecting_submit_handler(message: &'static str) -> MockSubmitHandler {
    let mut mock = MockSubmitHandler::new();
    mock.expect_on_submit()
        .returning(move |_| Err(anyhow::anyhow!(message)));
    mock
}
