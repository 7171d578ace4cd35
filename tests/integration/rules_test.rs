//! Extraction rule integration tests
//!
//! These tests cover rule persistence and batch evaluation through the
//! runtime, including the isolation of failing rules.

use super::{json_response, test_runtime};
use rest_client_scripting::history::ChangeSource;
use rest_client_scripting::models::ResponseSnapshot;
use rest_client_scripting::rules::{ExtractionMethod, ExtractionRule, RuleStore};
use rest_client_scripting::variables::VariableScope;
use tempfile::TempDir;

fn order_response() -> ResponseSnapshot {
    json_response(201, r#"{"order":{"id":"ord-991","items":[{"sku":"A1"},{"sku":"B2"}]}}"#)
        .with_header("Location", "/orders/ord-991")
}

#[test]
fn test_invalid_rule_does_not_stop_batch() {
    let runtime = test_runtime();
    runtime
        .rules()
        .add(
            ExtractionRule::new("broken", ExtractionMethod::Regex, "([unclosed", "broken")
                .with_scope(VariableScope::Global),
        )
        .unwrap();
    runtime
        .rules()
        .add(
            ExtractionRule::new("order id", ExtractionMethod::JsonPath, "$.order.id", "orderId")
                .with_scope(VariableScope::Collection),
        )
        .unwrap();

    let report = runtime.apply_rules(&order_response());

    assert_eq!(report.applied.len(), 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].rule_name, "broken");
    assert_eq!(
        runtime
            .variables()
            .get("orderId", Some(VariableScope::Collection))
            .as_deref(),
        Some("ord-991")
    );
    assert_eq!(runtime.variables().get("broken", None), None);

    let history = runtime.history().get_history(Some("orderId"), None);
    assert_eq!(history[0].source, ChangeSource::Rule);
}

#[test]
fn test_disabled_rules_are_skipped() {
    let runtime = test_runtime();
    let id = runtime
        .rules()
        .add(ExtractionRule::new(
            "location",
            ExtractionMethod::Header,
            "Location",
            "orderUrl",
        ))
        .unwrap();
    runtime.rules().set_enabled(&id, false).unwrap();

    let report = runtime.apply_rules(&order_response());

    assert!(report.applied.is_empty());
    assert_eq!(runtime.variables().get("orderUrl", None), None);
}

#[test]
fn test_capture_directives_feed_rules() {
    let runtime = test_runtime();
    let http_file = "# @capture orderId = $.order.id\n# @capture firstSku = $.order.items[0].sku\n# @capture orderUrl = headers.Location\nPOST https://api.example.com/orders\n";
    let imported = runtime
        .rules()
        .import_capture_directives(http_file, VariableScope::Request)
        .unwrap();
    assert_eq!(imported, 3);

    let report = runtime.apply_rules(&order_response());

    assert_eq!(report.success_count(), 3);
    let vars = runtime.variables();
    assert_eq!(vars.get("orderId", None).as_deref(), Some("ord-991"));
    assert_eq!(vars.get("firstSku", None).as_deref(), Some("A1"));
    assert_eq!(vars.get("orderUrl", None).as_deref(), Some("/orders/ord-991"));
}

#[test]
fn test_rules_survive_save_and_load() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("rules").join("extraction-rules.json");

    let store = RuleStore::new();
    store
        .add(ExtractionRule::new("sku", ExtractionMethod::Regex, r#""sku":"(\w+)""#, "sku"))
        .unwrap();
    store
        .add(ExtractionRule::new("id", ExtractionMethod::JsonPath, "$.order.id", "orderId"))
        .unwrap();
    store.save(&path).unwrap();

    let loaded = RuleStore::from_file(&path).unwrap();
    assert_eq!(loaded.list(), store.list());

    let runtime = test_runtime().with_rules(loaded);
    let report = runtime.apply_rules(&order_response());
    assert_eq!(report.success_count(), 2);
    assert_eq!(runtime.variables().get("sku", None).as_deref(), Some("A1"));
}

#[test]
fn test_later_rule_overwrites_same_variable() {
    let runtime = test_runtime();
    for (name, path) in [("first", "$.order.items[0].sku"), ("second", "$.order.items[1].sku")] {
        runtime
            .rules()
            .add(
                ExtractionRule::new(name, ExtractionMethod::JsonPath, path, "sku")
                    .with_scope(VariableScope::Environment),
            )
            .unwrap();
    }

    runtime.apply_rules(&order_response());

    assert_eq!(
        runtime
            .variables()
            .get("sku", Some(VariableScope::Environment))
            .as_deref(),
        Some("B2")
    );
    assert_eq!(runtime.history().get_history(Some("sku"), None).len(), 2);
}
