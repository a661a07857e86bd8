//! Integration tests for conditional fields and steps

use formflow_core::{FieldId, FieldProps, FormConfig, Navigation, SectionId, StepId};
use formflow_test_utils::assertions::{assert_current_step, assert_errors_only_for};
use formflow_test_utils::fixtures::{address_form, conditional_form};
use formflow_test_utils::{init_test_logging, SessionHarness};
use pretty_assertions::assert_eq;
use serde_json::json;

fn field_ids(ids: &[&str]) -> Vec<FieldId> {
    ids.iter().map(|id| FieldId::from(*id)).collect()
}

async fn started_address_form() -> SessionHarness {
    init_test_logging();
    SessionHarness::started(address_form(), FormConfig::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_country_reveals_province() {
    let harness = started_address_form().await;

    let view = harness.session.view().await;
    assert_eq!(view.visible_fields, field_ids(&["account", "state.country"]));

    // Country is required.
    let navigation = harness.session.next().await.unwrap();
    assert!(matches!(navigation, Navigation::Blocked { .. }));
    assert_errors_only_for(&harness.session.view().await, &["state.country"]).unwrap();

    let change = harness
        .session
        .set_field_value("state.country", json!("CA"))
        .await
        .unwrap();
    assert!(change.visibility_changed);
    assert!(!change.step_changed);

    let view = harness.session.view().await;
    assert_eq!(
        view.visible_fields,
        field_ids(&["account", "state.country", "state.province"])
    );
    assert!(view.errors.is_empty());

    // The revealed province is required too.
    let navigation = harness.session.next().await.unwrap();
    match navigation {
        Navigation::Blocked { step_id, errors } => {
            assert_eq!(step_id, StepId::from("address"));
            assert_eq!(
                errors.get("state.province").map(String::as_str),
                Some("Province is required")
            );
        }
        other => panic!("Expected a blocked move, got {:?}", other),
    }

    harness
        .session
        .set_field_value("state.province", json!("QC"))
        .await
        .unwrap();
    assert!(harness.session.next().await.unwrap().moved());
    assert_current_step(&harness.session.view().await, 1, "review").unwrap();
}

#[tokio::test]
async fn test_hiding_a_field_keeps_value_and_drops_error() {
    let harness = started_address_form().await;
    harness
        .session
        .set_field_value("state.country", json!("CA"))
        .await
        .unwrap();

    assert_eq!(
        harness.session.blur_field("state.province").await.unwrap(),
        Some("Province is required".to_string())
    );
    assert!(harness.session.errors().await.contains_key("state.province"));

    harness
        .session
        .set_field_value("state.country", json!(""))
        .await
        .unwrap();
    let view = harness.session.view().await;
    assert!(!view.visible_fields.contains(&FieldId::from("state.province")));
    assert!(!view.errors.contains_key("state.province"));

    harness
        .session
        .set_field_value("state.country", json!("CA"))
        .await
        .unwrap();
    harness
        .session
        .set_field_value("state.province", json!("QC"))
        .await
        .unwrap();
    harness
        .session
        .set_field_value("state.country", json!(""))
        .await
        .unwrap();

    let view = harness.session.view().await;
    assert_eq!(view.data.get("state.province"), Some(&json!("QC")));
    assert_eq!(harness.events.count("visibility.changed"), 4);
}

#[tokio::test]
async fn test_expression_condition_and_sections() {
    let harness = started_address_form().await;
    harness
        .session
        .set_field_value("account", json!("business"))
        .await
        .unwrap();
    harness
        .session
        .set_field_value("state.country", json!("CA"))
        .await
        .unwrap();

    let sections = harness.session.current_sections().await;
    let layout: Vec<(Option<SectionId>, Vec<FieldId>)> = sections
        .into_iter()
        .map(|(section, fields)| {
            (
                section,
                fields.into_iter().map(|props| props.field_id).collect(),
            )
        })
        .collect();
    assert_eq!(
        layout,
        vec![
            (
                Some(SectionId::from("account")),
                field_ids(&["account", "vat"])
            ),
            (
                Some(SectionId::from("location")),
                field_ids(&["state.country", "state.province"])
            ),
        ]
    );

    harness
        .session
        .set_field_value("account", json!("personal"))
        .await
        .unwrap();
    assert!(!harness
        .session
        .view()
        .await
        .visible_fields
        .contains(&FieldId::from("vat")));
}

#[tokio::test]
async fn test_render_current_step() {
    let harness = started_address_form().await;
    harness
        .session
        .set_field_value("state.country", json!("CA"))
        .await
        .unwrap();
    harness.session.blur_field("state.country").await.unwrap();

    let mut renderer = |props: &FieldProps| {
        format!(
            "{}{}={}",
            props.field_id,
            if props.required { "*" } else { "" },
            props.value
        )
    };
    let rendered = harness.session.render_current_step(&mut renderer).await;
    assert_eq!(
        rendered,
        vec![
            "account=null".to_string(),
            "state.country*=\"CA\"".to_string(),
            "state.province*=null".to_string(),
        ]
    );

    let props = harness.session.field_props("state.country").await.unwrap();
    assert!(props.touched);
    assert_eq!(props.error, None);
    assert!(harness.session.field_props("nope").await.is_err());
}

#[tokio::test]
async fn test_hidden_current_step_moves_forward() {
    init_test_logging();
    let harness = SessionHarness::started(conditional_form(), FormConfig::default())
        .await
        .unwrap();
    harness.session.set_field_value("plan", json!("pro")).await.unwrap();
    assert_eq!(harness.session.view().await.visible_steps.len(), 3);

    harness.session.next().await.unwrap();
    assert_current_step(&harness.session.view().await, 1, "seats").unwrap();

    // Hiding the step we are on keeps the index, which now points at `done`.
    let change = harness
        .session
        .set_field_value("plan", json!("basic"))
        .await
        .unwrap();
    assert!(change.step_changed);
    assert_current_step(&harness.session.view().await, 1, "done").unwrap();
    assert_eq!(
        harness.steps.changes().last(),
        Some(&(1, StepId::from("done")))
    );
}
