//! Step and field visibility
//!
//! Pure, order-preserving filters over the declared steps and fields. Nothing
//! here mutates the working data.

use crate::{
    domain::condition::is_satisfied,
    domain::form_definition::{FieldConfig, FormDefinition, StepDefinition},
    types::{FieldId, SectionId, StepId, WorkingData},
};
use std::collections::BTreeMap;

/// True if the step's condition is absent or holds
pub fn is_step_visible(step: &StepDefinition, data: &WorkingData) -> bool {
    is_satisfied(step.condition.as_ref(), data)
}

/// True if the field's condition holds and every dependency has a value
pub fn is_field_visible(field: &FieldConfig, data: &WorkingData) -> bool {
    field.depends_on.iter().all(|dep| data.has_value(dep.as_str()))
        && is_satisfied(field.condition.as_ref(), data)
}

/// Visible steps in declaration order
pub fn visible_steps<'a>(definition: &'a FormDefinition, data: &WorkingData) -> Vec<&'a StepDefinition> {
    definition
        .steps
        .iter()
        .filter(|step| is_step_visible(step, data))
        .collect()
}

/// Visible fields of a step, in the step's field order.
///
/// A hidden step has no visible fields.
pub fn visible_fields<'a>(
    definition: &'a FormDefinition,
    step: &StepDefinition,
    data: &WorkingData,
) -> Vec<&'a FieldConfig> {
    if !is_step_visible(step, data) {
        return Vec::new();
    }
    step.fields
        .iter()
        .filter_map(|id| definition.field(id))
        .filter(|field| is_field_visible(field, data))
        .collect()
}

/// Visible fields of a step grouped by section, sections in first-seen order.
/// Fields without a section are grouped under `None`.
pub fn visible_fields_by_section<'a>(
    definition: &'a FormDefinition,
    step: &StepDefinition,
    data: &WorkingData,
) -> Vec<(Option<SectionId>, Vec<&'a FieldConfig>)> {
    let mut groups: Vec<(Option<SectionId>, Vec<&'a FieldConfig>)> = Vec::new();
    for field in visible_fields(definition, step, data) {
        match groups.iter_mut().find(|(section, _)| *section == field.section) {
            Some((_, fields)) => fields.push(field),
            None => groups.push((field.section.clone(), vec![field])),
        }
    }
    groups
}

/// Snapshot of what is currently visible across the whole form
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VisibilityMap {
    /// Visible steps in declaration order
    pub steps: Vec<StepId>,

    /// Visible fields per visible step
    pub fields: BTreeMap<StepId, Vec<FieldId>>,
}

impl VisibilityMap {
    /// Compute visibility for every step and field
    pub fn compute(definition: &FormDefinition, data: &WorkingData) -> Self {
        let mut map = Self::default();
        for step in visible_steps(definition, data) {
            let fields = visible_fields(definition, step, data)
                .into_iter()
                .map(|field| field.id.clone())
                .collect();
            map.steps.push(step.id.clone());
            map.fields.insert(step.id.clone(), fields);
        }
        map
    }

    /// Index of a step among the visible steps
    pub fn step_index(&self, id: &StepId) -> Option<usize> {
        self.steps.iter().position(|step| step == id)
    }

    /// True if the field is visible on some visible step
    pub fn is_field_visible(&self, id: &FieldId) -> bool {
        self.fields.values().any(|fields| fields.contains(id))
    }

    /// Declared fields that are not visible (hidden steps included)
    pub fn hidden_fields(&self, definition: &FormDefinition) -> Vec<FieldId> {
        definition
            .fields
            .iter()
            .filter(|field| !self.is_field_visible(&field.id))
            .map(|field| field.id.clone())
            .collect()
    }
}
