//! A session wired to recording fakes, an in-memory store and a manual clock.

use crate::driver::{DriveReport, TimerDriver};
use crate::recorders::{
    RecordingAutoSaveHandler, RecordingEventHandler, RecordingStepListener,
    RecordingSubmitHandler,
};
use formflow_core::domain::repository::memory::MemorySnapshotStore;
use formflow_core::domain::timer::memory::ManualTimerService;
use formflow_core::{CoreError, FormConfig, FormDefinition, FormSession, WorkingData};
use std::sync::Arc;
use std::time::Duration;

/// Everything a scenario test needs around one [`FormSession`]
pub struct SessionHarness {
    /// Session under test
    pub session: Arc<FormSession>,
    /// Snapshot store shared with the session
    pub store: MemorySnapshotStore,
    /// Virtual clock
    pub timers: Arc<ManualTimerService>,
    /// Delivers fired timers to the session
    pub driver: TimerDriver,
    /// Records submissions
    pub submit: Arc<RecordingSubmitHandler>,
    /// Records autosave callbacks
    pub auto_save: Arc<RecordingAutoSaveHandler>,
    /// Records emitted events
    pub events: Arc<RecordingEventHandler>,
    /// Records step changes
    pub steps: Arc<RecordingStepListener>,
}

impl SessionHarness {
    /// Build a session with default config and no persistence
    pub fn new(definition: FormDefinition) -> Result<Self, CoreError> {
        Self::with_config(definition, FormConfig::default())
    }

    /// Build a session with `config` and a fresh store
    pub fn with_config(definition: FormDefinition, config: FormConfig) -> Result<Self, CoreError> {
        Self::build(definition, config, MemorySnapshotStore::new(), WorkingData::new())
    }

    /// Build a session sharing an existing store, as a page reload would
    pub fn with_store(
        definition: FormDefinition,
        config: FormConfig,
        store: MemorySnapshotStore,
    ) -> Result<Self, CoreError> {
        Self::build(definition, config, store, WorkingData::new())
    }

    /// Build a session from every part
    pub fn build(
        definition: FormDefinition,
        config: FormConfig,
        store: MemorySnapshotStore,
        initial_data: WorkingData,
    ) -> Result<Self, CoreError> {
        let timers = Arc::new(ManualTimerService::new());
        let submit = Arc::new(RecordingSubmitHandler::new());
        let auto_save = Arc::new(RecordingAutoSaveHandler::new());
        let events = Arc::new(RecordingEventHandler::new());
        let steps = Arc::new(RecordingStepListener::new());

        let mut builder = FormSession::builder(definition)
            .with_config(config.clone())
            .with_initial_data(initial_data)
            .with_submit_handler(submit.clone())
            .with_auto_save_handler(auto_save.clone())
            .with_timer_service(timers.clone())
            .with_event_handler(events.clone())
            .with_step_listener(steps.clone());
        if config.storage_key.is_some() {
            builder = builder.with_snapshot_store(Arc::new(store.clone()));
        }
        let session = Arc::new(builder.build()?);

        Ok(Self {
            session,
            store,
            driver: TimerDriver::new(timers.clone()),
            timers,
            submit,
            auto_save,
            events,
            steps,
        })
    }

    /// Build and start the session
    pub async fn started(definition: FormDefinition, config: FormConfig) -> Result<Self, CoreError> {
        let harness = Self::with_config(definition, config)?;
        harness.session.start().await?;
        Ok(harness)
    }

    /// Advance the virtual clock, delivering timers to the session
    pub async fn advance(&self, by: Duration) -> DriveReport {
        self.driver.advance(&self.session, by).await
    }

    /// Advance the virtual clock by `millis` milliseconds
    pub async fn advance_millis(&self, millis: u64) -> DriveReport {
        self.advance(Duration::from_millis(millis)).await
    }
}
