//! Final cross-step validation and submission

use crate::{
    application::collaborators::SubmitHandler,
    domain::step_controller::{StepController, StepReport},
    domain::validation::ValidationErrors,
    types::{merge_value, StepId},
    CoreError,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

/// Message shown when submission is blocked by invalid steps
pub const SUBMISSION_BLOCKED_MESSAGE: &str = "Please fix the errors before submitting";

/// Result of a submit request
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    /// Submit callback succeeded; snapshot cleared
    Submitted,

    /// A required step is invalid; the session moved to it
    Blocked {
        /// First visible, required, invalid step
        step_id: StepId,
        /// Its visible index
        step_index: usize,
        /// Its errors
        errors: ValidationErrors,
    },

    /// Submit callback failed; data and snapshot kept for a retry
    Failed {
        /// Failure reason
        error: String,
    },

    /// A submission is already in flight or the form was already submitted
    Ignored,
}

/// What the validation pass decided
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionPlan {
    /// Every required step is valid; submit this data
    Ready(Value),

    /// Submission must not proceed
    Blocked(StepReport),
}

/// Validates all visible steps and calls the submit handler
#[derive(Clone)]
pub struct SubmissionService {
    handler: Arc<dyn SubmitHandler>,
}

impl SubmissionService {
    /// Create a new submission service
    pub fn new(handler: Arc<dyn SubmitHandler>) -> Self {
        Self { handler }
    }

    /// Validate every visible step and decide whether to submit.
    ///
    /// Optional steps never block. When everything required is valid, the
    /// payload is the working data with each valid step's validated output
    /// merged on top.
    pub fn prepare(&self, controller: &mut StepController) -> SubmissionPlan {
        let reports = controller.validate_visible_steps();

        if let Some(blocking) = reports
            .iter()
            .find(|report| !report.optional && !report.result.is_valid)
        {
            info!(
                session_id = %controller.session_id(),
                step_id = %blocking.step_id,
                errors = blocking.result.errors.len(),
                "Submission blocked"
            );
            return SubmissionPlan::Blocked(blocking.clone());
        }

        let mut merged = controller.data().to_value();
        for report in &reports {
            if let Some(validated) = &report.result.validated_data {
                merge_value(&mut merged, validated);
            }
        }
        SubmissionPlan::Ready(merged)
    }

    /// Call the submit handler; failures come back as a `CallbackError`
    pub async fn submit(&self, data: Value) -> Result<(), CoreError> {
        self.handler.on_submit(data).await.map_err(|e| {
            error!(error = %e, "Submit callback failed");
            CoreError::CallbackError(e.to_string())
        })
    }
}
