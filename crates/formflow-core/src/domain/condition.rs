//! Visibility predicates for steps and fields
//!
//! A condition is either a caller-supplied predicate or a JMESPath expression
//! evaluated against the working data. Evaluation never fails from the
//! caller's point of view: errors and panics both count as `false`.

use crate::{types::WorkingData, CoreError};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Signature of a caller-supplied predicate
pub type PredicateFn = dyn Fn(&WorkingData) -> Result<bool, CoreError> + Send + Sync;

/// A visibility condition attached to a step or field
#[derive(Clone)]
pub enum Condition {
    /// Caller-supplied predicate
    Predicate(Arc<PredicateFn>),

    /// JMESPath expression; visible when the result is truthy
    Expression(String),
}

impl Condition {
    /// Wrap an infallible predicate
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&WorkingData) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(
            move |data: &WorkingData| -> Result<bool, CoreError> { Ok(predicate(data)) },
        ))
    }

    /// Wrap a predicate that may report an error
    pub fn fallible<F>(predicate: F) -> Self
    where
        F: Fn(&WorkingData) -> Result<bool, CoreError> + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(predicate))
    }

    /// Build a JMESPath condition
    pub fn expression(expression: impl Into<String>) -> Self {
        Self::Expression(expression.into())
    }

    /// Check that an expression condition compiles
    pub fn check(&self) -> Result<(), CoreError> {
        match self {
            Self::Predicate(_) => Ok(()),
            Self::Expression(expression) => jmespath::compile(expression)
                .map(|_| ())
                .map_err(|e| {
                    CoreError::ExpressionError(format!(
                        "Failed to compile JMESPath expression: {}: {}",
                        expression, e
                    ))
                }),
        }
    }

    /// Evaluate, surfacing failures
    pub fn try_evaluate(&self, data: &WorkingData) -> Result<bool, CoreError> {
        match self {
            Self::Predicate(predicate) => predicate(data),
            Self::Expression(expression) => {
                let compiled = jmespath::compile(expression).map_err(|e| {
                    CoreError::ExpressionError(format!(
                        "Failed to compile JMESPath expression: {}: {}",
                        expression, e
                    ))
                })?;
                let context = data.to_value();
                let result = compiled.search(&context).map_err(|e| {
                    CoreError::ExpressionError(format!(
                        "Failed to evaluate JMESPath expression: {}: {}",
                        expression, e
                    ))
                })?;
                Ok(result.is_truthy())
            }
        }
    }

    /// Evaluate; an error or a panic inside the predicate yields `false`
    pub fn evaluate(&self, data: &WorkingData) -> bool {
        match panic::catch_unwind(AssertUnwindSafe(|| self.try_evaluate(data))) {
            Ok(Ok(visible)) => visible,
            Ok(Err(e)) => {
                warn!(condition = ?self, error = %e, "Condition failed, treating as hidden");
                false
            }
            Err(_) => {
                warn!(condition = ?self, "Condition panicked, treating as hidden");
                false
            }
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Predicate(_) => f.write_str("Condition::Predicate(..)"),
            Self::Expression(expression) => {
                f.debug_tuple("Condition::Expression").field(expression).finish()
            }
        }
    }
}

/// Evaluate an optional condition; absence means visible
#[inline]
pub fn is_satisfied(condition: Option<&Condition>, data: &WorkingData) -> bool {
    condition.map_or(true, |condition| condition.evaluate(data))
}
