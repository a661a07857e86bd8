//! Sample form definitions.

use formflow_core::{
    Condition, FieldConfig, FormDefinition, SchemaOutcome, StepDefinition, ValidationErrors,
    ValidationRules, WorkingData,
};
use serde_json::Value;

/// Schema requiring every listed path to hold a non-blank value.
///
/// Valid output is the projection of those paths, like a real schema
/// library returning only the keys it knows.
pub fn require_paths(
    paths: &'static [&'static str],
) -> impl Fn(&WorkingData) -> SchemaOutcome + Send + Sync + 'static {
    move |data: &WorkingData| {
        let errors: ValidationErrors = paths
            .iter()
            .filter(|path| !data.has_value(path))
            .map(|path| (path.to_string(), format!("{} is required", path)))
            .collect();
        if errors.is_empty() {
            SchemaOutcome::Valid(data.project(paths.iter().copied()))
        } else {
            SchemaOutcome::Invalid(errors)
        }
    }
}

/// Three steps: `a` (required), `b` (optional), `c` (required).
///
/// * `a` needs `account.email`
/// * `b` needs `profile.bio`
/// * `c` needs `confirm.terms` and `confirm.signature`
pub fn three_step_form() -> FormDefinition {
    FormDefinition::new("three-step", "Three step form")
        .with_step(
            StepDefinition::new("a", "Account")
                .with_schema(require_paths(&["account.email"]))
                .with_field("account.email"),
        )
        .with_step(
            StepDefinition::new("b", "Profile")
                .optional()
                .with_schema(require_paths(&["profile.bio"]))
                .with_field("profile.bio"),
        )
        .with_step(
            StepDefinition::new("c", "Confirm")
                .with_schema(require_paths(&["confirm.terms", "confirm.signature"]))
                .with_field("confirm.terms")
                .with_field("confirm.signature"),
        )
        .with_field(FieldConfig::new("account.email", "Email"))
        .with_field(FieldConfig::new("profile.bio", "Bio"))
        .with_field(FieldConfig::new("confirm.terms", "Terms"))
        .with_field(FieldConfig::new("confirm.signature", "Signature"))
}

/// One address step where `state.province` depends on `state.country`,
/// followed by a review step. A `vat` field only shows for business accounts.
pub fn address_form() -> FormDefinition {
    FormDefinition::new("address", "Address")
        .with_step(
            StepDefinition::new("address", "Address")
                .with_field("account")
                .with_field("state.country")
                .with_field("state.province")
                .with_field("vat"),
        )
        .with_step(StepDefinition::new("review", "Review"))
        .with_field(FieldConfig::new("account", "Account type").in_section("account"))
        .with_field(
            FieldConfig::new("state.country", "Country")
                .in_section("location")
                .required(),
        )
        .with_field(
            FieldConfig::new("state.province", "Province")
                .in_section("location")
                .depends_on("state.country")
                .with_validation(ValidationRules::required()),
        )
        .with_field(
            FieldConfig::new("vat", "VAT number")
                .in_section("account")
                .with_condition(Condition::expression("account == 'business'")),
        )
}

/// Two steps where the second only shows when `plan` is `"pro"`.
pub fn conditional_form() -> FormDefinition {
    FormDefinition::new("plans", "Plans")
        .with_step(StepDefinition::new("plan", "Plan").with_field("plan"))
        .with_step(
            StepDefinition::new("seats", "Seats")
                .with_condition(Condition::new(|data| {
                    data.get("plan") == Some(&Value::String("pro".to_string()))
                }))
                .with_field("seats"),
        )
        .with_step(StepDefinition::new("done", "Done"))
        .with_field(FieldConfig::new("plan", "Plan"))
        .with_field(FieldConfig::new("seats", "Seats"))
}
