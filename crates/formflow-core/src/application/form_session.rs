//! Form session facade
//!
//! A [`FormSession`] wires the step controller, persistence manager and
//! submission service together and is the only API callers need. State sits
//! behind an async mutex. The lock is released while the submit callback
//! runs, so timers and a second submit request can interleave with it; the
//! latter is ignored.

use crate::{
    application::collaborators::{
        AutoSaveHandler, FormEventHandler, StepChangeListener, SubmitHandler,
    },
    application::field_binding::{group_by_section, FieldProps, FieldRenderer},
    application::persistence_manager::{PersistenceManager, SaveOutcome},
    application::submission_service::{
        SubmissionOutcome, SubmissionPlan, SubmissionService, SUBMISSION_BLOCKED_MESSAGE,
    },
    config::FormConfig,
    domain::events::{AutoSaveStatus, FormEvent, FormEventKind},
    domain::form_definition::FormDefinition,
    domain::repository::SnapshotStore,
    domain::step_controller::{FieldChange, FormStatus, Navigation, StepController},
    domain::timer::{TimerEvent, TimerService},
    domain::validation::ValidationErrors,
    types::{FieldId, SectionId, SessionId, StepId, WorkingData},
    CoreError,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tracing::{debug, info, trace, warn};

/// Read-only view of a session at one point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    /// Session status
    pub status: FormStatus,
    /// Autosave status
    pub auto_save_status: AutoSaveStatus,
    /// Index of the current step among the visible steps
    pub current_step_index: usize,
    /// ID of the current step
    pub current_step_id: Option<StepId>,
    /// Visible steps in order
    pub visible_steps: Vec<StepId>,
    /// Visible fields of the current step in order
    pub visible_fields: Vec<FieldId>,
    /// Completed steps
    pub completed_steps: BTreeSet<StepId>,
    /// Optional steps passed without being valid
    pub skipped_steps: BTreeSet<StepId>,
    /// Displayed errors
    pub errors: ValidationErrors,
    /// Completed share of the visible steps
    pub progress: f64,
    /// Working data
    pub data: WorkingData,
}

struct SessionState {
    controller: StepController,
    persistence: PersistenceManager,
    closed: bool,
}

impl SessionState {
    fn drain_events(&mut self) -> Vec<FormEvent> {
        let mut events = self.controller.take_events();
        events.extend(self.persistence.take_events());
        events
    }
}

/// One user's pass through a multi-step form
pub struct FormSession {
    session_id: SessionId,
    definition: Arc<FormDefinition>,
    config: FormConfig,
    state: Mutex<SessionState>,
    submission: SubmissionService,
    event_handler: Option<Arc<dyn FormEventHandler>>,
    step_listener: Option<Arc<dyn StepChangeListener>>,
}

/// Builder for [`FormSession`]
pub struct FormSessionBuilder {
    definition: Arc<FormDefinition>,
    config: FormConfig,
    session_id: Option<SessionId>,
    initial_data: WorkingData,
    submit_handler: Option<Arc<dyn SubmitHandler>>,
    auto_save_handler: Option<Arc<dyn AutoSaveHandler>>,
    snapshot_store: Option<Arc<dyn SnapshotStore>>,
    timers: Option<Arc<dyn TimerService>>,
    event_handler: Option<Arc<dyn FormEventHandler>>,
    step_listener: Option<Arc<dyn StepChangeListener>>,
}

impl FormSessionBuilder {
    /// Use this configuration
    pub fn with_config(mut self, config: FormConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a fixed session ID instead of a generated one
    pub fn with_session_id(mut self, session_id: impl Into<SessionId>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Data the form starts from; a resumed snapshot is merged on top
    pub fn with_initial_data(mut self, data: WorkingData) -> Self {
        self.initial_data = data;
        self
    }

    /// Required: receives the final data
    pub fn with_submit_handler(mut self, handler: Arc<dyn SubmitHandler>) -> Self {
        self.submit_handler = Some(handler);
        self
    }

    /// Called with the working data on every autosave
    pub fn with_auto_save_handler(mut self, handler: Arc<dyn AutoSaveHandler>) -> Self {
        self.auto_save_handler = Some(handler);
        self
    }

    /// Durable store for snapshots; needs `storage_key` in the config
    pub fn with_snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshot_store = Some(store);
        self
    }

    /// Required: schedules autosave timers
    pub fn with_timer_service(mut self, timers: Arc<dyn TimerService>) -> Self {
        self.timers = Some(timers);
        self
    }

    /// Receives every form event
    pub fn with_event_handler(mut self, handler: Arc<dyn FormEventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Notified on every step change
    pub fn with_step_listener(mut self, listener: Arc<dyn StepChangeListener>) -> Self {
        self.step_listener = Some(listener);
        self
    }

    /// Validate the definition and configuration and build the session
    pub fn build(self) -> Result<FormSession, CoreError> {
        self.definition.validate()?;
        self.config.validate()?;

        let submit_handler = self.submit_handler.ok_or_else(|| {
            CoreError::ConfigurationError("A submit handler is required".to_string())
        })?;
        let timers = self.timers.ok_or_else(|| {
            CoreError::ConfigurationError("A timer service is required".to_string())
        })?;

        let storage = match (self.config.storage_key.clone(), self.snapshot_store) {
            (Some(key), Some(store)) => Some((key, store)),
            (Some(key), None) => {
                return Err(CoreError::ConfigurationError(format!(
                    "storage_key {} is set but no snapshot store was provided",
                    key
                )))
            }
            (None, Some(_)) => {
                warn!("Snapshot store provided without a storage_key; snapshots are disabled");
                None
            }
            (None, None) => None,
        };

        let session_id = self.session_id.unwrap_or_else(SessionId::generate);
        let controller = StepController::new(
            session_id.clone(),
            self.definition.clone(),
            self.config.controller_options(),
            self.initial_data,
        );
        let persistence = PersistenceManager::new(
            session_id.clone(),
            storage,
            self.auto_save_handler,
            timers,
            self.config.auto_save.clone(),
            self.config.snapshot_max_age(),
        );

        debug!(session_id = %session_id, form_id = %self.definition.id, "Form session created");

        Ok(FormSession {
            session_id,
            definition: self.definition,
            config: self.config,
            state: Mutex::new(SessionState {
                controller,
                persistence,
                closed: false,
            }),
            submission: SubmissionService::new(submit_handler),
            event_handler: self.event_handler,
            step_listener: self.step_listener,
        })
    }
}

impl FormSession {
    /// Start building a session for a form definition
    pub fn builder(definition: impl Into<Arc<FormDefinition>>) -> FormSessionBuilder {
        FormSessionBuilder {
            definition: definition.into(),
            config: FormConfig::default(),
            session_id: None,
            initial_data: WorkingData::new(),
            submit_handler: None,
            auto_save_handler: None,
            snapshot_store: None,
            timers: None,
            event_handler: None,
            step_listener: None,
        }
    }

    /// Session ID
    #[inline]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Form definition
    #[inline]
    pub fn definition(&self) -> &Arc<FormDefinition> {
        &self.definition
    }

    /// Session configuration
    #[inline]
    pub fn config(&self) -> &FormConfig {
        &self.config
    }

    // ----------------------------------------------------------------------
    // Lifecycle
    // ----------------------------------------------------------------------

    /// Restore any persisted progress and start the session.
    ///
    /// Returns true if a snapshot was resumed.
    pub async fn start(&self) -> Result<bool, CoreError> {
        let mut state = self.lock_open().await?;
        if state.controller.status() != FormStatus::NotStarted {
            return Err(CoreError::InvalidTransition(format!(
                "Cannot start session in state: {:?}",
                state.controller.status()
            )));
        }

        let resumed = match state.persistence.load().await {
            Some(body) => {
                state
                    .controller
                    .restore(&body.data, body.current_step_index, body.completed_steps)?;
                true
            }
            None => false,
        };
        state.controller.start()?;
        state.persistence.start().await?;

        info!(session_id = %self.session_id, resumed, "Form session started");
        let mut events = vec![FormEvent::new(
            self.session_id.clone(),
            FormEventKind::SessionStarted { resumed },
        )];
        events.extend(state.drain_events());
        drop(state);

        self.dispatch(events).await;
        Ok(resumed)
    }

    /// Cancel all timers; every later call fails with `SessionClosed` and
    /// late timer events are ignored
    pub async fn teardown(&self) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.persistence.teardown().await;
        state.closed = true;
        info!(session_id = %self.session_id, "Form session torn down");
    }

    /// True after teardown
    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    // ----------------------------------------------------------------------
    // Data entry
    // ----------------------------------------------------------------------

    /// Set one value by dot-delimited path
    pub async fn set_field_value(&self, path: &str, value: Value) -> Result<FieldChange, CoreError> {
        let mut state = self.lock_started().await?;
        let change = state.controller.set_field_value(path, value)?;
        state.persistence.notify_mutation().await;

        let events = state.drain_events();
        drop(state);
        self.dispatch(events).await;
        Ok(change)
    }

    /// The field lost focus
    pub async fn blur_field(&self, path: &str) -> Result<Option<String>, CoreError> {
        let mut state = self.lock_started().await?;
        if self.definition.field_by_path(path).is_none() {
            return Err(CoreError::FieldNotFound(path.to_string()));
        }
        let error = state.controller.blur_field(path)?;

        let events = state.drain_events();
        drop(state);
        self.dispatch(events).await;
        Ok(error)
    }

    /// Props of one declared field
    pub async fn field_props(&self, path: &str) -> Result<FieldProps, CoreError> {
        let field = self
            .definition
            .field_by_path(path)
            .ok_or_else(|| CoreError::FieldNotFound(path.to_string()))?;
        let state = self.state.lock().await;
        Ok(FieldProps::from_controller(field, &state.controller))
    }

    /// Props of the visible fields of the current step, in order
    pub async fn visible_field_props(&self) -> Vec<FieldProps> {
        let state = self.state.lock().await;
        state
            .controller
            .visible_fields()
            .into_iter()
            .map(|field| FieldProps::from_controller(field, &state.controller))
            .collect()
    }

    /// Visible fields of the current step grouped by section
    pub async fn current_sections(&self) -> Vec<(Option<SectionId>, Vec<FieldProps>)> {
        group_by_section(self.visible_field_props().await)
    }

    /// Render every visible field of the current step
    pub async fn render_current_step<R: FieldRenderer>(&self, renderer: &mut R) -> Vec<R::Output> {
        self.visible_field_props()
            .await
            .iter()
            .map(|props| renderer.render(props))
            .collect()
    }

    // ----------------------------------------------------------------------
    // Navigation
    // ----------------------------------------------------------------------

    /// Move to a visible step; see [`StepController::go_to_step`]
    pub async fn go_to_step(&self, target: usize) -> Result<Navigation, CoreError> {
        self.navigate(|controller| controller.go_to_step(target)).await
    }

    /// Move to the next visible step
    pub async fn next(&self) -> Result<Navigation, CoreError> {
        self.navigate(StepController::next).await
    }

    /// Move to the previous visible step
    pub async fn previous(&self) -> Result<Navigation, CoreError> {
        self.navigate(StepController::previous).await
    }

    /// Skip the current optional step
    pub async fn skip(&self) -> Result<Navigation, CoreError> {
        self.navigate(StepController::skip).await
    }

    async fn navigate<F>(&self, op: F) -> Result<Navigation, CoreError>
    where
        F: FnOnce(&mut StepController) -> Result<Navigation, CoreError>,
    {
        let mut state = self.lock_started().await?;
        let navigation = op(&mut state.controller)?;
        if navigation.moved() {
            let body = state.controller.snapshot_body();
            state.persistence.save(&body).await;
        }

        let events = state.drain_events();
        drop(state);
        self.dispatch(events).await;
        Ok(navigation)
    }

    // ----------------------------------------------------------------------
    // Submission
    // ----------------------------------------------------------------------

    /// Validate every visible step and submit.
    ///
    /// Returns `Ignored` while another submission is in flight or after a
    /// successful one.
    pub async fn submit(&self) -> Result<SubmissionOutcome, CoreError> {
        let mut state = self.lock_started().await?;
        if matches!(
            state.controller.status(),
            FormStatus::Submitting | FormStatus::Completed
        ) {
            debug!(session_id = %self.session_id, status = ?state.controller.status(), "Submit ignored");
            return Ok(SubmissionOutcome::Ignored);
        }

        state.controller.begin_submit()?;
        let data = match self.submission.prepare(&mut state.controller) {
            SubmissionPlan::Ready(data) => data,
            SubmissionPlan::Blocked(report) => {
                state
                    .controller
                    .block_submit(&report, SUBMISSION_BLOCKED_MESSAGE);
                let events = state.drain_events();
                drop(state);
                self.dispatch(events).await;
                return Ok(SubmissionOutcome::Blocked {
                    step_id: report.step_id,
                    step_index: report.index,
                    errors: report.result.errors,
                });
            }
        };

        let events = state.drain_events();
        drop(state);
        self.dispatch(events).await;

        info!(session_id = %self.session_id, "Submitting form");
        let result = self.submission.submit(data).await;

        let mut state = self.state.lock().await;
        let outcome = match result {
            Ok(()) => {
                state.controller.complete_submit();
                if let Err(e) = state.persistence.clear().await {
                    warn!(session_id = %self.session_id, error = %e, "Failed to clear snapshot after submit");
                }
                state.persistence.retire().await;
                info!(session_id = %self.session_id, "Form submitted");
                SubmissionOutcome::Submitted
            }
            Err(e) => {
                let error = match e {
                    CoreError::CallbackError(message) => message,
                    other => other.to_string(),
                };
                state.controller.fail_submit(&error);
                SubmissionOutcome::Failed { error }
            }
        };

        let events = state.drain_events();
        drop(state);
        self.dispatch(events).await;
        Ok(outcome)
    }

    // ----------------------------------------------------------------------
    // Persistence
    // ----------------------------------------------------------------------

    /// Deliver a fired timer. Events of other sessions, stale timers and
    /// anything after teardown are ignored.
    pub async fn handle_timer_event(&self, event: TimerEvent) -> Option<SaveOutcome> {
        let mut state = self.state.lock().await;
        if state.closed || event.session_id != self.session_id {
            trace!(session_id = %self.session_id, timer_id = %event.timer_id.0, "Timer event dropped");
            return None;
        }

        let body = state.controller.snapshot_body();
        let outcome = state.persistence.handle_timer(&event, &body).await;

        let events = state.drain_events();
        drop(state);
        self.dispatch(events).await;
        outcome
    }

    /// Feed timer events from a channel until it closes or the session is
    /// torn down
    pub async fn run_timers(&self, mut timer_events: mpsc::UnboundedReceiver<TimerEvent>) {
        while let Some(event) = timer_events.recv().await {
            self.handle_timer_event(event).await;
            if self.is_closed().await {
                break;
            }
        }
        debug!(session_id = %self.session_id, "Timer loop finished");
    }

    /// Save immediately; identical payloads are still skipped, and nothing
    /// is written once the form has been submitted
    pub async fn save_now(&self) -> Result<SaveOutcome, CoreError> {
        let mut state = self.lock_started().await?;
        let body = state.controller.snapshot_body();
        let outcome = state.persistence.save(&body).await;

        let events = state.drain_events();
        drop(state);
        self.dispatch(events).await;
        Ok(outcome)
    }

    /// Back to the initial data and the first step; the snapshot is deleted
    pub async fn reset(&self) -> Result<(), CoreError> {
        let mut state = self.lock_started().await?;
        state.controller.reset()?;
        state.persistence.reset().await;
        if let Err(e) = state.persistence.clear().await {
            warn!(session_id = %self.session_id, error = %e, "Failed to clear snapshot on reset");
        }
        info!(session_id = %self.session_id, "Form reset");

        let events = state.drain_events();
        drop(state);
        self.dispatch(events).await;
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Queries
    // ----------------------------------------------------------------------

    /// Snapshot of the observable state
    pub async fn view(&self) -> SessionView {
        let state = self.state.lock().await;
        let controller = &state.controller;
        SessionView {
            status: controller.status(),
            auto_save_status: state.persistence.status(),
            current_step_index: controller.current_step_index(),
            current_step_id: controller.current_step().map(|step| step.id.clone()),
            visible_steps: controller.visibility().steps.clone(),
            visible_fields: controller
                .visible_fields()
                .into_iter()
                .map(|field| field.id.clone())
                .collect(),
            completed_steps: controller.completed_steps().clone(),
            skipped_steps: controller.skipped_steps().clone(),
            errors: controller.errors().clone(),
            progress: controller.progress(),
            data: controller.data().clone(),
        }
    }

    /// Session status
    pub async fn status(&self) -> FormStatus {
        self.state.lock().await.controller.status()
    }

    /// Autosave status
    pub async fn auto_save_status(&self) -> AutoSaveStatus {
        self.state.lock().await.persistence.status()
    }

    /// Index of the current step among the visible steps
    pub async fn current_step_index(&self) -> usize {
        self.state.lock().await.controller.current_step_index()
    }

    /// Copy of the working data
    pub async fn data(&self) -> WorkingData {
        self.state.lock().await.controller.data().clone()
    }

    /// Displayed errors
    pub async fn errors(&self) -> ValidationErrors {
        self.state.lock().await.controller.errors().clone()
    }

    // ----------------------------------------------------------------------
    // Internals
    // ----------------------------------------------------------------------

    async fn lock_open(&self) -> Result<MutexGuard<'_, SessionState>, CoreError> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(CoreError::SessionClosed(self.session_id.to_string()));
        }
        Ok(state)
    }

    async fn lock_started(&self) -> Result<MutexGuard<'_, SessionState>, CoreError> {
        let state = self.lock_open().await?;
        if state.controller.status() == FormStatus::NotStarted {
            return Err(CoreError::InvalidTransition(
                "Session has not been started".to_string(),
            ));
        }
        Ok(state)
    }

    async fn dispatch(&self, events: Vec<FormEvent>) {
        for event in events {
            if let (Some(listener), FormEventKind::StepChanged { to, step_id, .. }) =
                (&self.step_listener, &event.kind)
            {
                listener.on_step_change(*to, step_id);
            }
            if let Some(handler) = &self.event_handler {
                let event_type = event.event_type();
                if let Err(e) = handler.handle_event(event).await {
                    warn!(session_id = %self.session_id, event_type, error = %e, "Event handler failed");
                }
            }
        }
    }
}
