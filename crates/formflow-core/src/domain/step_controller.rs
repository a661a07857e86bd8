//! Step controller: the state machine at the heart of a form session
//!
//! The controller exclusively owns the working data. Every mutation goes
//! through [`StepController::set_field_value`], which recomputes visibility
//! and records events, so observers and persistence always see a consistent
//! state.

use crate::{
    domain::events::{FormEvent, FormEventKind},
    domain::form_definition::{FieldConfig, FormDefinition, StepDefinition},
    domain::snapshot::SnapshotBody,
    domain::validation::{validate_step, StepValidationResult, ValidationErrors},
    domain::visibility::{self, VisibilityMap},
    types::{path_is_within, FieldId, SessionId, StepId, WorkingData},
    CoreError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Form session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormStatus {
    /// Created, progress not yet restored
    NotStarted,

    /// User is filling in steps
    InProgress,

    /// Submit callback in flight
    Submitting,

    /// Submitted successfully
    Completed,

    /// Last submission failed; data kept for a retry
    Failed,
}

/// Behaviour switches for the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    /// Refuse forward navigation past an invalid required step
    pub validate_on_step_change: bool,

    /// Re-validate a field every time it changes
    pub validate_on_change: bool,

    /// Validate a field when it loses focus
    pub validate_on_blur: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            validate_on_step_change: true,
            validate_on_change: false,
            validate_on_blur: true,
        }
    }
}

/// Outcome of a navigation request
#[derive(Debug, Clone, PartialEq)]
pub enum Navigation {
    /// Current step changed
    Moved {
        /// Previous index
        from: usize,
        /// New index
        to: usize,
    },

    /// Target was already the current step
    Unchanged,

    /// Forward move refused; the current step is invalid
    Blocked {
        /// Step that failed validation
        step_id: StepId,
        /// Its errors
        errors: ValidationErrors,
    },
}

impl Navigation {
    /// True if the current step changed
    pub fn moved(&self) -> bool {
        matches!(self, Self::Moved { .. })
    }
}

/// Outcome of a field update
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    /// Value the path held before
    pub previous: Option<Value>,

    /// Whether visible steps or fields changed
    pub visibility_changed: bool,

    /// Whether the current step changed because of the visibility change
    pub step_changed: bool,
}

/// Aggregate validation of every visible step
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// Visible index of the step
    pub index: usize,
    /// Step ID
    pub step_id: StepId,
    /// Whether the step is optional
    pub optional: bool,
    /// Its validation result
    pub result: StepValidationResult,
}

/// Multi-step state machine
pub struct StepController {
    session_id: SessionId,
    definition: Arc<FormDefinition>,
    options: ControllerOptions,
    status: FormStatus,
    initial_data: WorkingData,
    data: WorkingData,
    current_step_index: usize,
    completed_steps: BTreeSet<StepId>,
    skipped_steps: BTreeSet<StepId>,
    step_results: HashMap<StepId, StepValidationResult>,
    errors: ValidationErrors,
    touched: BTreeSet<FieldId>,
    visibility: VisibilityMap,
    events: Vec<FormEvent>,
}

impl StepController {
    /// Create a controller positioned on the first visible step
    pub fn new(
        session_id: SessionId,
        definition: Arc<FormDefinition>,
        options: ControllerOptions,
        initial_data: WorkingData,
    ) -> Self {
        let visibility = VisibilityMap::compute(&definition, &initial_data);
        Self {
            session_id,
            definition,
            options,
            status: FormStatus::NotStarted,
            data: initial_data.clone(),
            initial_data,
            current_step_index: 0,
            completed_steps: BTreeSet::new(),
            skipped_steps: BTreeSet::new(),
            step_results: HashMap::new(),
            errors: ValidationErrors::new(),
            touched: BTreeSet::new(),
            visibility,
            events: Vec::with_capacity(8),
        }
    }

    /// Apply persisted progress on top of the initial data.
    ///
    /// Persisted values win for the keys they define. The step index is
    /// clamped to the visible steps and unknown step IDs are dropped, so a
    /// snapshot taken against an older form definition still loads.
    pub fn restore(
        &mut self,
        persisted: &WorkingData,
        current_step_index: usize,
        completed_steps: BTreeSet<StepId>,
    ) -> Result<(), CoreError> {
        if self.status != FormStatus::NotStarted {
            return Err(CoreError::InvalidTransition(format!(
                "Cannot restore progress in state: {:?}",
                self.status
            )));
        }

        self.data.merge_from(persisted);
        self.visibility = VisibilityMap::compute(&self.definition, &self.data);
        self.current_step_index = clamp_index(current_step_index, self.visibility.steps.len());
        self.completed_steps = completed_steps
            .into_iter()
            .filter(|id| self.definition.step(id).is_some())
            .collect();

        debug!(
            session_id = %self.session_id,
            current_step_index = self.current_step_index,
            completed = self.completed_steps.len(),
            "Restored form progress"
        );
        Ok(())
    }

    /// Begin the session
    pub fn start(&mut self) -> Result<(), CoreError> {
        if self.status != FormStatus::NotStarted {
            return Err(CoreError::InvalidTransition(format!(
                "Cannot start form in state: {:?}",
                self.status
            )));
        }
        self.status = FormStatus::InProgress;
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Accessors
    // ----------------------------------------------------------------------

    /// Session this controller belongs to
    #[inline]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Form definition
    #[inline]
    pub fn definition(&self) -> &Arc<FormDefinition> {
        &self.definition
    }

    /// Current status
    #[inline]
    pub fn status(&self) -> FormStatus {
        self.status
    }

    /// Working data
    #[inline]
    pub fn data(&self) -> &WorkingData {
        &self.data
    }

    /// Index of the current step among the visible steps
    #[inline]
    pub fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    /// Current step; `None` only if every step is hidden
    pub fn current_step(&self) -> Option<&StepDefinition> {
        self.visibility
            .steps
            .get(self.current_step_index)
            .and_then(|id| self.definition.step(id))
    }

    /// Visible steps in declaration order
    pub fn visible_steps(&self) -> Vec<&StepDefinition> {
        self.visibility
            .steps
            .iter()
            .filter_map(|id| self.definition.step(id))
            .collect()
    }

    /// Number of visible steps
    #[inline]
    pub fn visible_step_count(&self) -> usize {
        self.visibility.steps.len()
    }

    /// Visible fields of the current step
    pub fn visible_fields(&self) -> Vec<&FieldConfig> {
        match self.current_step() {
            Some(step) => visibility::visible_fields(&self.definition, step, &self.data),
            None => Vec::new(),
        }
    }

    /// Current visibility of the whole form
    #[inline]
    pub fn visibility(&self) -> &VisibilityMap {
        &self.visibility
    }

    /// Errors currently displayed, keyed by field path
    #[inline]
    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    /// Error displayed for one field
    pub fn error_for(&self, path: &str) -> Option<&str> {
        self.errors.get(path).map(String::as_str)
    }

    /// Completed steps
    #[inline]
    pub fn completed_steps(&self) -> &BTreeSet<StepId> {
        &self.completed_steps
    }

    /// Optional steps passed without being valid
    #[inline]
    pub fn skipped_steps(&self) -> &BTreeSet<StepId> {
        &self.skipped_steps
    }

    /// Fields that have lost focus at least once
    #[inline]
    pub fn touched(&self) -> &BTreeSet<FieldId> {
        &self.touched
    }

    /// Last validation result recorded for a step
    pub fn step_result(&self, id: &StepId) -> Option<&StepValidationResult> {
        self.step_results.get(id)
    }

    /// True on the first visible step
    #[inline]
    pub fn is_first_step(&self) -> bool {
        self.current_step_index == 0
    }

    /// True on the last visible step
    #[inline]
    pub fn is_last_step(&self) -> bool {
        self.current_step_index + 1 >= self.visibility.steps.len()
    }

    /// Share of visible steps that are completed, in `[0, 1]`
    pub fn progress(&self) -> f64 {
        let visible = self.visibility.steps.len();
        if visible == 0 {
            return 0.0;
        }
        let completed = self
            .visibility
            .steps
            .iter()
            .filter(|id| self.completed_steps.contains(*id))
            .count();
        completed as f64 / visible as f64
    }

    /// State to persist
    pub fn snapshot_body(&self) -> SnapshotBody {
        SnapshotBody {
            data: self.data.clone(),
            current_step_index: self.current_step_index,
            completed_steps: self.completed_steps.clone(),
        }
    }

    /// Drain recorded events
    pub fn take_events(&mut self) -> Vec<FormEvent> {
        std::mem::take(&mut self.events)
    }

    // ----------------------------------------------------------------------
    // Data entry
    // ----------------------------------------------------------------------

    /// The single entry point for changing working data.
    ///
    /// Clears the displayed error for the path, recomputes visibility and
    /// drops errors of fields that became hidden. Hidden fields keep their
    /// values.
    pub fn set_field_value(&mut self, path: &str, value: Value) -> Result<FieldChange, CoreError> {
        self.ensure_editable("set a field value")?;

        let previous = self.data.set(path, value)?;
        self.errors.retain(|error_path, _| !path_is_within(error_path, path));
        self.record(FormEventKind::FieldChanged {
            field_id: FieldId::from(path),
        });

        let before = self.current_step().map(|step| step.id.clone());
        let visibility_changed = self.refresh_visibility();

        if self.options.validate_on_change {
            self.validate_field(path);
        }

        Ok(FieldChange {
            previous,
            visibility_changed,
            step_changed: before.as_ref() != self.current_step().map(|step| &step.id),
        })
    }

    /// Mark a field touched and, if enabled, validate it.
    ///
    /// A blur is not an edit: it is rejected while submitting or after
    /// completion, and it leaves a `Failed` status alone.
    pub fn blur_field(&mut self, path: &str) -> Result<Option<String>, CoreError> {
        self.ensure_accepts_input("blur a field")?;
        self.touched.insert(FieldId::from(path));
        if self.options.validate_on_blur {
            Ok(self.validate_field(path))
        } else {
            Ok(None)
        }
    }

    /// Validate a single visible field and update its displayed error
    pub fn validate_field(&mut self, path: &str) -> Option<String> {
        let definition = self.definition.clone();
        let Some(step) = definition.step_for_field(&FieldId::from(path)) else {
            return None;
        };
        let visible = visibility::visible_fields(&definition, step, &self.data)
            .iter()
            .any(|field| field.id.as_str() == path);
        if !visible {
            self.errors.remove(path);
            return None;
        }

        let result = validate_step(&definition, step, &self.data);
        match result.errors.get(path) {
            Some(message) => {
                self.errors.insert(path.to_string(), message.clone());
                Some(message.clone())
            }
            None => {
                self.errors.remove(path);
                None
            }
        }
    }

    /// Validate the current step and record the result
    pub fn validate_current_step(&mut self) -> Option<StepValidationResult> {
        let definition = self.definition.clone();
        let step_id = self.visibility.steps.get(self.current_step_index)?.clone();
        let step = definition.step(&step_id)?;
        let result = validate_step(&definition, step, &self.data);
        self.step_results.insert(step_id, result.clone());
        Some(result)
    }

    /// Validate every visible step against the working data and record the results
    pub fn validate_visible_steps(&mut self) -> Vec<StepReport> {
        let definition = self.definition.clone();
        let mut reports = Vec::with_capacity(self.visibility.steps.len());

        for (index, step_id) in self.visibility.steps.clone().into_iter().enumerate() {
            let Some(step) = definition.step(&step_id) else {
                continue;
            };
            let result = validate_step(&definition, step, &self.data);
            self.step_results.insert(step_id.clone(), result.clone());
            reports.push(StepReport {
                index,
                step_id,
                optional: step.optional,
                result,
            });
        }

        reports
    }

    // ----------------------------------------------------------------------
    // Navigation
    // ----------------------------------------------------------------------

    /// Move to a visible step.
    ///
    /// Moving forward validates the current step first. An invalid required
    /// step blocks the move when `validate_on_step_change` is on. Moving back
    /// never validates.
    pub fn go_to_step(&mut self, target: usize) -> Result<Navigation, CoreError> {
        self.ensure_editable("navigate")?;

        let visible = self.visibility.steps.len();
        if target >= visible {
            return Err(CoreError::StepOutOfRange {
                index: target,
                visible,
            });
        }

        let from = self.current_step_index;
        if target == from {
            return Ok(Navigation::Unchanged);
        }

        if target > from {
            let (step_id, optional) = match self.current_step() {
                Some(step) => (step.id.clone(), step.optional),
                None => return Err(CoreError::StepNotFound(format!("index {}", from))),
            };
            let result = self
                .validate_current_step()
                .ok_or_else(|| CoreError::StepNotFound(step_id.0.clone()))?;

            if result.is_valid {
                self.mark_completed(step_id);
            } else if optional {
                self.mark_skipped(step_id);
            } else if self.options.validate_on_step_change {
                info!(
                    session_id = %self.session_id,
                    step_id = %step_id,
                    errors = result.errors.len(),
                    "Forward navigation blocked by invalid step"
                );
                self.errors = result.errors.clone();
                self.record(FormEventKind::StepValidationFailed {
                    step_id: step_id.clone(),
                    errors: result.errors.clone(),
                });
                return Ok(Navigation::Blocked {
                    step_id,
                    errors: result.errors,
                });
            }
        }

        Ok(self.move_to(target))
    }

    /// Move to the next visible step
    pub fn next(&mut self) -> Result<Navigation, CoreError> {
        if self.is_last_step() {
            return Err(CoreError::InvalidTransition(
                "Already on the last step".to_string(),
            ));
        }
        self.go_to_step(self.current_step_index + 1)
    }

    /// Move to the previous visible step
    pub fn previous(&mut self) -> Result<Navigation, CoreError> {
        if self.is_first_step() {
            return Err(CoreError::InvalidTransition(
                "Already on the first step".to_string(),
            ));
        }
        self.go_to_step(self.current_step_index - 1)
    }

    /// Skip an optional step that is not the last one, without validating it
    pub fn skip(&mut self) -> Result<Navigation, CoreError> {
        self.ensure_editable("skip a step")?;

        let step = self
            .current_step()
            .ok_or_else(|| CoreError::StepNotFound(format!("index {}", self.current_step_index)))?;
        if !step.optional {
            return Err(CoreError::InvalidTransition(format!(
                "Step {} is not optional",
                step.id
            )));
        }
        if self.is_last_step() {
            return Err(CoreError::InvalidTransition(format!(
                "Step {} is the last step and cannot be skipped",
                step.id
            )));
        }

        let step_id = step.id.clone();
        self.mark_skipped(step_id);
        Ok(self.move_to(self.current_step_index + 1))
    }

    /// Restore the initial data and return to the first step
    pub fn reset(&mut self) -> Result<(), CoreError> {
        self.ensure_editable("reset the form")?;

        self.data = self.initial_data.clone();
        self.completed_steps.clear();
        self.skipped_steps.clear();
        self.step_results.clear();
        self.errors.clear();
        self.touched.clear();
        self.refresh_visibility();

        let from = self.current_step_index;
        self.current_step_index = 0;
        if from != 0 {
            if let Some(step_id) = self.visibility.steps.first().cloned() {
                self.record(FormEventKind::StepChanged {
                    from,
                    to: 0,
                    step_id,
                });
            }
        }
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Submission
    // ----------------------------------------------------------------------

    /// Enter `Submitting`; a second concurrent submission is refused
    pub fn begin_submit(&mut self) -> Result<(), CoreError> {
        match self.status {
            FormStatus::Submitting => Err(CoreError::SubmissionInProgress),
            FormStatus::InProgress | FormStatus::Failed => {
                self.status = FormStatus::Submitting;
                self.record(FormEventKind::SubmissionStarted);
                Ok(())
            }
            other => Err(CoreError::InvalidTransition(format!(
                "Cannot submit form in state: {:?}",
                other
            ))),
        }
    }

    /// Leave `Submitting` without calling the submit callback: navigate to
    /// the blocking step and show its errors
    pub fn block_submit(&mut self, report: &StepReport, message: &str) {
        self.status = FormStatus::InProgress;
        if report.index != self.current_step_index {
            self.move_to(report.index);
        }
        self.errors = report.result.errors.clone();
        self.record(FormEventKind::SubmissionBlocked {
            step_id: report.step_id.clone(),
            step_index: report.index,
            message: message.to_string(),
        });
    }

    /// Submit callback succeeded
    pub fn complete_submit(&mut self) {
        self.status = FormStatus::Completed;
        self.errors.clear();
        self.record(FormEventKind::SubmissionSucceeded);
    }

    /// Submit callback failed; data stays for a retry
    pub fn fail_submit(&mut self, error: &str) {
        self.status = FormStatus::Failed;
        self.record(FormEventKind::SubmissionFailed {
            error: error.to_string(),
        });
    }

    // ----------------------------------------------------------------------
    // Internals
    // ----------------------------------------------------------------------

    fn ensure_accepts_input(&self, action: &str) -> Result<(), CoreError> {
        match self.status {
            FormStatus::NotStarted | FormStatus::InProgress | FormStatus::Failed => Ok(()),
            other => Err(CoreError::InvalidTransition(format!(
                "Cannot {} in state: {:?}",
                action, other
            ))),
        }
    }

    fn ensure_editable(&mut self, action: &str) -> Result<(), CoreError> {
        self.ensure_accepts_input(action)?;
        if self.status == FormStatus::Failed {
            self.status = FormStatus::InProgress;
        }
        Ok(())
    }

    fn record(&mut self, kind: FormEventKind) {
        self.events.push(FormEvent::new(self.session_id.clone(), kind));
    }

    fn mark_completed(&mut self, step_id: StepId) {
        self.skipped_steps.remove(&step_id);
        if self.completed_steps.insert(step_id.clone()) {
            debug!(session_id = %self.session_id, step_id = %step_id, "Step completed");
        }
        self.record(FormEventKind::StepCompleted { step_id });
    }

    fn mark_skipped(&mut self, step_id: StepId) {
        self.completed_steps.insert(step_id.clone());
        self.skipped_steps.insert(step_id.clone());
        debug!(session_id = %self.session_id, step_id = %step_id, "Optional step skipped");
        self.record(FormEventKind::StepSkipped { step_id });
    }

    fn move_to(&mut self, target: usize) -> Navigation {
        let from = self.current_step_index;
        self.current_step_index = target;
        self.errors.clear();

        let step_id = self.visibility.steps[target].clone();
        debug!(session_id = %self.session_id, from, to = target, step_id = %step_id, "Step changed");
        self.record(FormEventKind::StepChanged {
            from,
            to: target,
            step_id,
        });
        Navigation::Moved { from, to: target }
    }

    /// Recompute visibility after a data change. Keeps the current step when
    /// it is still visible, otherwise clamps into range. Returns true if
    /// anything visible changed.
    fn refresh_visibility(&mut self) -> bool {
        let next = VisibilityMap::compute(&self.definition, &self.data);
        if next == self.visibility {
            return false;
        }

        let current_id = self.visibility.steps.get(self.current_step_index).cloned();
        let hidden_fields = next.hidden_fields(&self.definition);
        self.errors.retain(|path, _| {
            !hidden_fields
                .iter()
                .any(|hidden| path_is_within(path, hidden.as_str()))
        });

        let from = self.current_step_index;
        let tracked = current_id.as_ref().and_then(|id| next.step_index(id));
        let to = tracked.unwrap_or_else(|| clamp_index(from, next.steps.len()));
        self.visibility = next;

        self.record(FormEventKind::VisibilityChanged {
            visible_steps: self.visibility.steps.clone(),
            hidden_fields,
        });

        self.current_step_index = to;
        if tracked.is_none() && to != from && from >= self.visibility.steps.len() {
            info!(session_id = %self.session_id, from, to, "Current step clamped to visible range");
            self.record(FormEventKind::CurrentStepClamped { from, to });
        }
        let now_current = self.visibility.steps.get(to).cloned();
        let id_changed = now_current != current_id;
        if id_changed || to != from {
            if let Some(step_id) = now_current {
                if id_changed {
                    self.errors.clear();
                }
                self.record(FormEventKind::StepChanged { from, to, step_id });
            }
        }

        true
    }
}

fn clamp_index(index: usize, visible: usize) -> usize {
    index.min(visible.saturating_sub(1))
}
