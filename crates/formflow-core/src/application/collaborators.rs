//! Caller-supplied collaborators
//!
//! Submit and autosave callbacks are the only long-running operations of a
//! session. Their failures are caught by the session and turned into status
//! changes and events.

use crate::{domain::events::FormEvent, types::StepId, CoreError};
use async_trait::async_trait;
use serde_json::Value;

/// Receives the validated, merged data on submit
#[async_trait]
pub trait SubmitHandler: Send + Sync {
    /// Submit the final data
    async fn on_submit(&self, data: Value) -> anyhow::Result<()>;
}

/// Receives the working data on every autosave
#[async_trait]
pub trait AutoSaveHandler: Send + Sync {
    /// Persist partial data somewhere the caller controls
    async fn on_auto_save(&self, data: Value) -> anyhow::Result<()>;
}

/// Notified synchronously whenever the current step changes
pub trait StepChangeListener: Send + Sync {
    /// `step_index` is the index among visible steps
    fn on_step_change(&self, step_index: usize, step_id: &StepId);
}

impl<F> StepChangeListener for F
where
    F: Fn(usize, &StepId) + Send + Sync,
{
    fn on_step_change(&self, step_index: usize, step_id: &StepId) {
        self(step_index, step_id)
    }
}

/// Handler for form events
#[async_trait]
pub trait FormEventHandler: Send + Sync {
    /// Handle a form event
    async fn handle_event(&self, event: FormEvent) -> Result<(), CoreError>;
}

/// Event handler that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventHandler;

#[async_trait]
impl FormEventHandler for TracingEventHandler {
    async fn handle_event(&self, event: FormEvent) -> Result<(), CoreError> {
        tracing::debug!(
            session_id = %event.session_id,
            event_type = event.event_type(),
            "Form event"
        );
        Ok(())
    }
}
