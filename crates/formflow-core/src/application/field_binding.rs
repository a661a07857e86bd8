//! Field binding contract
//!
//! The engine never renders inputs. For every visible field of the current
//! step it hands a [`FieldProps`] to a caller-supplied [`FieldRenderer`];
//! the renderer routes changes and blurs back through
//! `FormSession::set_field_value` and `FormSession::blur_field` using
//! `field_id`.

use crate::{
    domain::form_definition::FieldConfig,
    domain::step_controller::StepController,
    types::{FieldId, SectionId},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Everything a renderer needs to draw one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldProps {
    /// Path of the field; changes and blurs are routed by it
    pub field_id: FieldId,

    /// Display label
    pub label: String,

    /// Section the field is grouped under
    pub section: Option<SectionId>,

    /// Current value, `Null` when unset
    pub value: Value,

    /// Displayed error
    pub error: Option<String>,

    /// Whether the field is required
    pub required: bool,

    /// Whether the field has lost focus at least once
    pub touched: bool,
}

impl FieldProps {
    pub(crate) fn from_controller(field: &FieldConfig, controller: &StepController) -> Self {
        let path = field.id.as_str();
        Self {
            field_id: field.id.clone(),
            label: field.label.clone(),
            section: field.section.clone(),
            value: controller.data().get(path).cloned().unwrap_or(Value::Null),
            error: controller.error_for(path).map(str::to_string),
            required: field.validation.required,
            touched: controller.touched().contains(&field.id),
        }
    }
}

/// Renders one field from its props
pub trait FieldRenderer {
    /// What rendering a field produces
    type Output;

    /// Render a single field
    fn render(&mut self, props: &FieldProps) -> Self::Output;
}

impl<F, O> FieldRenderer for F
where
    F: FnMut(&FieldProps) -> O,
{
    type Output = O;

    fn render(&mut self, props: &FieldProps) -> O {
        self(props)
    }
}

/// Props of the visible fields of the current step, grouped by section in
/// first-seen order
pub fn group_by_section(props: Vec<FieldProps>) -> Vec<(Option<SectionId>, Vec<FieldProps>)> {
    let mut groups: Vec<(Option<SectionId>, Vec<FieldProps>)> = Vec::new();
    for field in props {
        match groups.iter_mut().find(|(section, _)| *section == field.section) {
            Some((_, fields)) => fields.push(field),
            None => groups.push((field.section.clone(), vec![field])),
        }
    }
    groups
}
