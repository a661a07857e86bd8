//! Recording fakes of the collaborator traits.
//!
//! Each fake remembers every call so tests can assert on what the session
//! did, and can be switched to fail on demand.

use async_trait::async_trait;
use formflow_core::{
    AutoSaveHandler, CoreError, FormEvent, FormEventHandler, StepChangeListener, StepId,
    SubmitHandler,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};

/// Submit handler that records payloads
#[derive(Default)]
pub struct RecordingSubmitHandler {
    calls: Mutex<Vec<Value>>,
    fail_with: Mutex<Option<String>>,
}

impl RecordingSubmitHandler {
    /// Create a handler that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail subsequent submissions with `message`; `None` accepts again
    pub fn fail_with(&self, message: Option<&str>) {
        *self.fail_with.lock() = message.map(str::to_string);
    }

    /// Payloads received so far
    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().clone()
    }

    /// Number of submissions received
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl SubmitHandler for RecordingSubmitHandler {
    async fn on_submit(&self, data: Value) -> anyhow::Result<()> {
        self.calls.lock().push(data);
        match self.fail_with.lock().clone() {
            Some(message) => Err(anyhow::anyhow!(message)),
            None => Ok(()),
        }
    }
}

/// Autosave handler that records payloads
#[derive(Default)]
pub struct RecordingAutoSaveHandler {
    calls: Mutex<Vec<Value>>,
    fail: AtomicBool,
}

impl RecordingAutoSaveHandler {
    /// Create a handler that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent calls fail (or succeed again)
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Payloads received so far
    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().clone()
    }

    /// Number of calls received
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl AutoSaveHandler for RecordingAutoSaveHandler {
    async fn on_auto_save(&self, data: Value) -> anyhow::Result<()> {
        self.calls.lock().push(data);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("autosave backend unavailable");
        }
        Ok(())
    }
}

/// Event handler that keeps every event
#[derive(Default)]
pub struct RecordingEventHandler {
    events: Mutex<Vec<FormEvent>>,
}

impl RecordingEventHandler {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// All events received so far
    pub fn events(&self) -> Vec<FormEvent> {
        self.events.lock().clone()
    }

    /// Event type strings in arrival order
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(FormEvent::event_type).collect()
    }

    /// Number of events of one type
    pub fn count(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.event_type() == event_type)
            .count()
    }

    /// Forget everything recorded
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

#[async_trait]
impl FormEventHandler for RecordingEventHandler {
    async fn handle_event(&self, event: FormEvent) -> Result<(), CoreError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Step listener that keeps every `(index, step)` notification
#[derive(Default)]
pub struct RecordingStepListener {
    changes: Mutex<Vec<(usize, StepId)>>,
}

impl RecordingStepListener {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications received so far
    pub fn changes(&self) -> Vec<(usize, StepId)> {
        self.changes.lock().clone()
    }
}

impl StepChangeListener for RecordingStepListener {
    fn on_step_change(&self, step_index: usize, step_id: &StepId) {
        self.changes.lock().push((step_index, step_id.clone()));
    }
}
