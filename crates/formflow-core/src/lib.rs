//!
//! Formflow Core - Step-gated form orchestration engine
//!
//! This crate drives multi-step data collection: conditional step and field
//! visibility, per-step and aggregate validation, debounced and periodic
//! autosave, and resumable persisted progress. Rendering, schema internals
//! and transport are left to the caller through small collaborator traits.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - definitions, state machine, events and repository seams
pub mod domain;

/// Application services - persistence, submission and the session facade
pub mod application;

/// Session configuration
pub mod config;

/// Core types
pub mod types;

/// Error types
pub mod error;

#[cfg(test)]
pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("formflow_core=debug")),
        )
        .with_test_writer()
        .try_init();
}

// Re-export key types
pub use config::{AutoSaveConfig, FormConfig};
pub use error::CoreError;
pub use types::{FieldId, SectionId, SessionId, StepId, WorkingData};

// Re-export main API types for easy use
pub use application::collaborators::{
    AutoSaveHandler, FormEventHandler, StepChangeListener, SubmitHandler, TracingEventHandler,
};
pub use application::field_binding::{FieldProps, FieldRenderer};
pub use application::form_session::{FormSession, FormSessionBuilder, SessionView};
pub use application::persistence_manager::SaveOutcome;
pub use application::submission_service::{SubmissionOutcome, SUBMISSION_BLOCKED_MESSAGE};
pub use domain::condition::Condition;
pub use domain::events::{AutoSaveStatus, FormEvent, FormEventKind};
pub use domain::form_definition::{FieldConfig, FormDefinition, StepDefinition};
pub use domain::repository::SnapshotStore;
pub use domain::snapshot::{PersistedSnapshot, SnapshotBody};
pub use domain::step_controller::{FieldChange, FormStatus, Navigation};
pub use domain::timer::{TimerEvent, TimerId, TimerKind, TimerService, TokioTimerService};
pub use domain::validation::{
    PermissiveSchema, Schema, SchemaOutcome, StepValidationResult, ValidationErrors,
    ValidationRules,
};
