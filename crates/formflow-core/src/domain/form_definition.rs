use crate::{
    domain::condition::Condition,
    domain::validation::{PermissiveSchema, Schema, ValidationRules},
    types::{split_path, FieldId, SectionId, StepId},
    CoreError,
};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// A form: ordered steps plus the configuration of every field they collect
#[derive(Debug, Clone)]
pub struct FormDefinition {
    /// ID of the form
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Steps in declaration order
    pub steps: Vec<StepDefinition>,

    /// Field configurations, in declaration order
    pub fields: Vec<FieldConfig>,
}

/// One page of the form
#[derive(Clone)]
pub struct StepDefinition {
    /// ID of the step
    pub id: StepId,

    /// Display title
    pub title: String,

    /// Display description
    pub description: Option<String>,

    /// Schema validated against the working data when leaving the step
    pub schema: Arc<dyn Schema>,

    /// Optional steps may be skipped and never block submission
    pub optional: bool,

    /// Visibility condition; absent means always visible
    pub condition: Option<Condition>,

    /// Fields collected on this step, in display order
    pub fields: Vec<FieldId>,
}

/// Configuration of a single input
#[derive(Debug, Clone)]
pub struct FieldConfig {
    /// Dot-delimited path of the value in the working data
    pub id: FieldId,

    /// Display label
    pub label: String,

    /// Section grouping within the step
    pub section: Option<SectionId>,

    /// Fields that must hold a non-blank value for this one to show
    pub depends_on: Vec<FieldId>,

    /// Visibility condition; absent means always visible
    pub condition: Option<Condition>,

    /// Field-level rules
    pub validation: ValidationRules,
}

impl StepDefinition {
    /// Create a required step with a permissive schema and no fields
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: StepId(id.into()),
            title: title.into(),
            description: None,
            schema: Arc::new(PermissiveSchema),
            optional: false,
            condition: None,
            fields: Vec::new(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a schema
    pub fn with_schema<S: Schema + 'static>(mut self, schema: S) -> Self {
        self.schema = Arc::new(schema);
        self
    }

    /// Attach a shared schema
    pub fn with_shared_schema(mut self, schema: Arc<dyn Schema>) -> Self {
        self.schema = schema;
        self
    }

    /// Mark the step optional
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Attach a visibility condition
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Append a field reference
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.fields.push(FieldId(field.into()));
        self
    }
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("optional", &self.optional)
            .field("condition", &self.condition)
            .field("fields", &self.fields)
            .finish()
    }
}

impl FieldConfig {
    /// Create a field with no rules, dependencies or condition
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: FieldId(id.into()),
            label: label.into(),
            section: None,
            depends_on: Vec::new(),
            condition: None,
            validation: ValidationRules::default(),
        }
    }

    /// Place the field in a section
    pub fn in_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(SectionId(section.into()));
        self
    }

    /// Add a dependency on another field
    pub fn depends_on(mut self, field: impl Into<String>) -> Self {
        self.depends_on.push(FieldId(field.into()));
        self
    }

    /// Attach a visibility condition
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Mark the field required
    pub fn required(mut self) -> Self {
        self.validation.required = true;
        self
    }

    /// Replace the field rules
    pub fn with_validation(mut self, validation: ValidationRules) -> Self {
        self.validation = validation;
        self
    }
}

impl FormDefinition {
    /// Create an empty definition
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            steps: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Append a step
    pub fn with_step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    /// Append a field configuration
    pub fn with_field(mut self, field: FieldConfig) -> Self {
        self.fields.push(field);
        self
    }

    /// Find a step by ID
    pub fn step(&self, id: &StepId) -> Option<&StepDefinition> {
        self.steps.iter().find(|step| &step.id == id)
    }

    /// Find a field configuration by ID
    pub fn field(&self, id: &FieldId) -> Option<&FieldConfig> {
        self.fields.iter().find(|field| &field.id == id)
    }

    /// Find a field configuration by its path
    pub fn field_by_path(&self, path: &str) -> Option<&FieldConfig> {
        self.fields.iter().find(|field| field.id.as_str() == path)
    }

    /// Find the step a field belongs to
    pub fn step_for_field(&self, id: &FieldId) -> Option<&StepDefinition> {
        self.steps.iter().find(|step| step.fields.contains(id))
    }

    /// Validate the form definition
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.steps.is_empty() {
            return Err(CoreError::InvalidDefinition(
                "Form must have at least one step".to_string(),
            ));
        }

        let mut step_ids = HashSet::new();
        for step in &self.steps {
            if !step_ids.insert(&step.id) {
                return Err(CoreError::InvalidDefinition(format!(
                    "Duplicate step ID: {}",
                    step.id
                )));
            }
            if let Some(condition) = &step.condition {
                condition.check()?;
            }
        }

        let mut field_ids = HashSet::new();
        for field in &self.fields {
            split_path(field.id.as_str()).map_err(|_| {
                CoreError::InvalidDefinition(format!("Invalid field path: {}", field.id))
            })?;
            if !field_ids.insert(&field.id) {
                return Err(CoreError::InvalidDefinition(format!(
                    "Duplicate field ID: {}",
                    field.id
                )));
            }
            if let Some(condition) = &field.condition {
                condition.check()?;
            }
        }

        let mut owners: HashMap<&FieldId, &StepId> = HashMap::new();
        for step in &self.steps {
            for field in &step.fields {
                if !field_ids.contains(field) {
                    return Err(CoreError::InvalidDefinition(format!(
                        "Step {} references undeclared field: {}",
                        step.id, field
                    )));
                }
                if let Some(owner) = owners.insert(field, &step.id) {
                    return Err(CoreError::InvalidDefinition(format!(
                        "Field {} belongs to both step {} and step {}",
                        field, owner, step.id
                    )));
                }
            }
        }

        for field in &self.fields {
            for dep in &field.depends_on {
                if !field_ids.contains(dep) {
                    return Err(CoreError::InvalidDefinition(format!(
                        "Field {} depends on undeclared field: {}",
                        field.id, dep
                    )));
                }
            }
        }

        self.check_for_cycles()
    }

    /// Check for cycles in the field dependencies
    fn check_for_cycles(&self) -> Result<(), CoreError> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();

        let dep_map: HashMap<&str, &Vec<FieldId>> = self
            .fields
            .iter()
            .map(|field| (field.id.as_str(), &field.depends_on))
            .collect();

        for field in &self.fields {
            if Self::is_cyclic(field.id.as_str(), &dep_map, &mut visited, &mut rec_stack) {
                return Err(CoreError::InvalidDefinition(format!(
                    "Cycle detected in field dependencies involving field: {}",
                    field.id
                )));
            }
        }

        Ok(())
    }

    fn is_cyclic<'a>(
        field_id: &'a str,
        dep_map: &HashMap<&'a str, &'a Vec<FieldId>>,
        visited: &mut HashSet<&'a str>,
        rec_stack: &mut HashSet<&'a str>,
    ) -> bool {
        if visited.insert(field_id) {
            rec_stack.insert(field_id);

            if let Some(deps) = dep_map.get(field_id) {
                for dep in deps.iter() {
                    let dep = dep.as_str();
                    if (!visited.contains(dep) && Self::is_cyclic(dep, dep_map, visited, rec_stack))
                        || rec_stack.contains(dep)
                    {
                        return true;
                    }
                }
            }
        }

        rec_stack.remove(field_id);
        false
    }
}
