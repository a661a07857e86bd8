//! Assertion utilities for validating session views.

use formflow_core::{FormEvent, FormStatus, SessionView, StepId};
use std::collections::BTreeSet;
use thiserror::Error;

/// Error type for session view validation failures
#[derive(Debug, Error)]
pub enum SessionAssertionError {
    #[error("Invalid status: expected {expected}, got {actual}")]
    InvalidStatus { expected: String, actual: String },

    #[error("Invalid current step: expected {expected}, got {actual}")]
    InvalidCurrentStep { expected: String, actual: String },

    #[error("Step sets differ: expected {expected:?}, got {actual:?}")]
    StepSetMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Unexpected error fields: expected only {expected:?}, got {actual:?}")]
    UnexpectedErrors {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Missing event: {0}")]
    MissingEvent(String),
}

fn step_names(steps: &BTreeSet<StepId>) -> Vec<String> {
    steps.iter().map(|step| step.0.clone()).collect()
}

fn sorted(ids: &[&str]) -> Vec<String> {
    let mut ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Asserts the session status
pub fn assert_status(view: &SessionView, expected: FormStatus) -> Result<(), SessionAssertionError> {
    if view.status != expected {
        return Err(SessionAssertionError::InvalidStatus {
            expected: format!("{:?}", expected),
            actual: format!("{:?}", view.status),
        });
    }
    Ok(())
}

/// Asserts the current step by visible index and ID
pub fn assert_current_step(
    view: &SessionView,
    index: usize,
    step_id: &str,
) -> Result<(), SessionAssertionError> {
    let actual_id = view
        .current_step_id
        .as_ref()
        .map(|id| id.0.as_str())
        .unwrap_or("<none>");
    if view.current_step_index != index || actual_id != step_id {
        return Err(SessionAssertionError::InvalidCurrentStep {
            expected: format!("{} ({})", index, step_id),
            actual: format!("{} ({})", view.current_step_index, actual_id),
        });
    }
    Ok(())
}

/// Asserts the completed steps are exactly `expected`
pub fn assert_completed(view: &SessionView, expected: &[&str]) -> Result<(), SessionAssertionError> {
    let actual = step_names(&view.completed_steps);
    let expected = sorted(expected);
    if actual != expected {
        return Err(SessionAssertionError::StepSetMismatch { expected, actual });
    }
    Ok(())
}

/// Asserts the skipped steps are exactly `expected`
pub fn assert_skipped(view: &SessionView, expected: &[&str]) -> Result<(), SessionAssertionError> {
    let actual = step_names(&view.skipped_steps);
    let expected = sorted(expected);
    if actual != expected {
        return Err(SessionAssertionError::StepSetMismatch { expected, actual });
    }
    Ok(())
}

/// Asserts displayed errors exist for exactly the given fields
pub fn assert_errors_only_for(
    view: &SessionView,
    fields: &[&str],
) -> Result<(), SessionAssertionError> {
    let actual: Vec<String> = view.errors.keys().cloned().collect();
    let expected = sorted(fields);
    if actual != expected {
        return Err(SessionAssertionError::UnexpectedErrors { expected, actual });
    }
    Ok(())
}

/// Asserts an event of the given type was recorded
pub fn assert_event_recorded(
    events: &[FormEvent],
    event_type: &str,
) -> Result<(), SessionAssertionError> {
    if events.iter().any(|event| event.event_type() == event_type) {
        Ok(())
    } else {
        Err(SessionAssertionError::MissingEvent(event_type.to_string()))
    }
}
