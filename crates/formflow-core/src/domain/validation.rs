//! Validation contract and step validation
//!
//! Schemas are supplied by the caller and treated as opaque: given the full
//! working data they either accept it (returning the validated data) or report
//! one message per invalid dot-joined path. Field-level rules (`required`,
//! custom validators) are layered on top for the fields currently visible.

use crate::{
    domain::form_definition::{FormDefinition, StepDefinition},
    domain::visibility,
    types::{is_blank, path_is_within, WorkingData},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Error messages keyed by dot-joined field path
pub type ValidationErrors = BTreeMap<String, String>;

/// Result of running a schema
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaOutcome {
    /// Data accepted; carries the (possibly transformed) validated data
    Valid(Value),

    /// Data rejected
    Invalid(ValidationErrors),
}

/// A declarative schema supplied by the caller
pub trait Schema: Send + Sync {
    /// Validate the full working data; unrelated keys must be ignored
    fn validate(&self, data: &WorkingData) -> SchemaOutcome;
}

impl<F> Schema for F
where
    F: Fn(&WorkingData) -> SchemaOutcome + Send + Sync,
{
    fn validate(&self, data: &WorkingData) -> SchemaOutcome {
        self(data)
    }
}

/// Schema that accepts anything. It has no output of its own, so the step's
/// fields pass through to submission unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveSchema;

impl Schema for PermissiveSchema {
    fn validate(&self, _data: &WorkingData) -> SchemaOutcome {
        SchemaOutcome::Valid(Value::Object(Default::default()))
    }
}

/// Custom field validator: `(value, full data) -> error message`
pub type CustomValidator = Arc<dyn Fn(&Value, &WorkingData) -> Option<String> + Send + Sync>;

/// Field-level rule set
#[derive(Clone, Default)]
pub struct ValidationRules {
    /// Field must hold a non-blank value
    pub required: bool,

    /// Message used when a required field is blank
    pub required_message: Option<String>,

    /// Custom validator
    pub custom: Option<CustomValidator>,
}

impl ValidationRules {
    /// Rules with only `required` set
    pub fn required() -> Self {
        Self {
            required: true,
            ..Self::default()
        }
    }

    /// Override the required message
    pub fn with_required_message(mut self, message: impl Into<String>) -> Self {
        self.required_message = Some(message.into());
        self
    }

    /// Attach a custom validator
    pub fn with_custom<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value, &WorkingData) -> Option<String> + Send + Sync + 'static,
    {
        self.custom = Some(Arc::new(validator));
        self
    }
}

impl fmt::Debug for ValidationRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRules")
            .field("required", &self.required)
            .field("required_message", &self.required_message)
            .field("custom", &self.custom.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Validation result for one step
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepValidationResult {
    /// True when no errors were found
    pub is_valid: bool,

    /// One message per invalid field path
    pub errors: ValidationErrors,

    /// Schema output, present only when valid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validated_data: Option<Value>,
}

impl StepValidationResult {
    /// A passing result
    pub fn valid(validated_data: Value) -> Self {
        Self {
            is_valid: true,
            errors: ValidationErrors::new(),
            validated_data: Some(validated_data),
        }
    }

    /// A failing result
    pub fn invalid(errors: ValidationErrors) -> Self {
        Self {
            is_valid: false,
            errors,
            validated_data: None,
        }
    }
}

/// Run one field's rules against the data
pub fn validate_field_rules(
    label: &str,
    path: &str,
    rules: &ValidationRules,
    data: &WorkingData,
) -> Option<String> {
    let value = data.get(path).cloned().unwrap_or(Value::Null);

    if rules.required && is_blank(&value) {
        return Some(
            rules
                .required_message
                .clone()
                .unwrap_or_else(|| format!("{} is required", label)),
        );
    }

    rules.custom.as_ref().and_then(|custom| custom(&value, data))
}

/// Validate a step: its schema plus the rules of its visible fields.
///
/// Schema errors reported for fields of this step that are currently hidden
/// are dropped, since the user has no way to correct them.
pub fn validate_step(
    definition: &FormDefinition,
    step: &StepDefinition,
    data: &WorkingData,
) -> StepValidationResult {
    let visible = visibility::visible_fields(definition, step, data);
    let hidden: Vec<&str> = step
        .fields
        .iter()
        .map(|id| id.as_str())
        .filter(|id| !visible.iter().any(|field| field.id.as_str() == *id))
        .collect();

    let (mut errors, validated_data) = match step.schema.validate(data) {
        SchemaOutcome::Valid(validated) => (ValidationErrors::new(), Some(validated)),
        SchemaOutcome::Invalid(errors) => (errors, None),
    };

    errors.retain(|path, _| !hidden.iter().any(|hidden| path_is_within(path, hidden)));

    for field in &visible {
        if errors.contains_key(field.id.as_str()) {
            continue;
        }
        if let Some(message) =
            validate_field_rules(&field.label, field.id.as_str(), &field.validation, data)
        {
            errors.insert(field.id.0.clone(), message);
        }
    }

    if errors.is_empty() {
        // A schema may have rejected only hidden fields; fall back to the visible values.
        let validated = validated_data
            .unwrap_or_else(|| data.project(visible.iter().map(|field| field.id.as_str())));
        StepValidationResult::valid(validated)
    } else {
        StepValidationResult::invalid(errors)
    }
}
