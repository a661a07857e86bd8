use crate::{
    domain::validation::ValidationErrors,
    types::{FieldId, SessionId, StepId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Autosave state shown to the user; never persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AutoSaveStatus {
    /// Nothing in flight
    #[default]
    Idle,

    /// A save is running
    Saving,

    /// Last save succeeded
    Saved,

    /// Last save failed
    Error,
}

/// Something observable that happened in a form session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FormEventKind {
    /// Session started; `resumed` is true when a snapshot was restored
    SessionStarted {
        /// Whether progress was restored from a snapshot
        resumed: bool,
    },

    /// A field value changed
    FieldChanged {
        /// Path that changed
        field_id: FieldId,
    },

    /// Visible steps or fields changed after a mutation
    VisibilityChanged {
        /// Visible steps after the change
        visible_steps: Vec<StepId>,
        /// Declared fields now hidden
        hidden_fields: Vec<FieldId>,
    },

    /// Current step changed
    StepChanged {
        /// Previous index
        from: usize,
        /// New index
        to: usize,
        /// ID of the new current step
        step_id: StepId,
    },

    /// A step validated and was marked completed
    StepCompleted {
        /// Completed step
        step_id: StepId,
    },

    /// An optional step was passed without being valid
    StepSkipped {
        /// Skipped step
        step_id: StepId,
    },

    /// Forward navigation was refused because the step is invalid
    StepValidationFailed {
        /// Step that failed
        step_id: StepId,
        /// Errors found
        errors: ValidationErrors,
    },

    /// The current step index was pulled back into range
    CurrentStepClamped {
        /// Index before clamping
        from: usize,
        /// Index after clamping
        to: usize,
    },

    /// Submission started
    SubmissionStarted,

    /// Submission blocked by an invalid required step
    SubmissionBlocked {
        /// First invalid required step
        step_id: StepId,
        /// Its visible index
        step_index: usize,
        /// Aggregate message for the user
        message: String,
    },

    /// Submit callback succeeded
    SubmissionSucceeded,

    /// Submit callback failed; data is kept for a retry
    SubmissionFailed {
        /// Failure reason
        error: String,
    },

    /// Autosave status changed
    AutoSaveStatusChanged {
        /// New status
        status: AutoSaveStatus,
    },

    /// An autosave attempt failed
    AutoSaveFailed {
        /// Failure reason
        error: String,
    },

    /// The persisted snapshot was deleted
    SnapshotCleared,
}

impl FormEventKind {
    /// Returns the type of the event as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session.started",
            Self::FieldChanged { .. } => "field.changed",
            Self::VisibilityChanged { .. } => "visibility.changed",
            Self::StepChanged { .. } => "step.changed",
            Self::StepCompleted { .. } => "step.completed",
            Self::StepSkipped { .. } => "step.skipped",
            Self::StepValidationFailed { .. } => "step.validation_failed",
            Self::CurrentStepClamped { .. } => "step.clamped",
            Self::SubmissionStarted => "submission.started",
            Self::SubmissionBlocked { .. } => "submission.blocked",
            Self::SubmissionSucceeded => "submission.succeeded",
            Self::SubmissionFailed { .. } => "submission.failed",
            Self::AutoSaveStatusChanged { .. } => "autosave.status_changed",
            Self::AutoSaveFailed { .. } => "autosave.failed",
            Self::SnapshotCleared => "snapshot.cleared",
        }
    }
}

/// A recorded event with its session and timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormEvent {
    /// Session the event belongs to
    pub session_id: SessionId,

    /// What happened
    pub kind: FormEventKind,

    /// When it happened
    pub timestamp: DateTime<Utc>,
}

impl FormEvent {
    /// Stamp an event now
    pub fn new(session_id: SessionId, kind: FormEventKind) -> Self {
        Self {
            session_id,
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Returns the type of the event as a string
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }
}
