//! End-to-end integration tests for the scripting runtime
//!
//! These tests drive the public API the way a request pipeline does:
//! pre-request script, substitution, rules, test script, and then inspect
//! variables and history.

use super::{json_response, login_request, test_runtime};
use proptest::prelude::*;
use rest_client_scripting::config::ScriptingConfig;
use rest_client_scripting::extraction::{extract_from_json, extract_with_regex};
use rest_client_scripting::history::{ChangeSource, HistoryTracker};
use rest_client_scripting::models::{HttpMethod, RequestSnapshot};
use rest_client_scripting::scripting::{SandboxExecutor, ScriptContext};
use rest_client_scripting::variables::{VariableHandle, VariableScope, VariableStore};
use rest_client_scripting::ScriptLanguage;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

const LOGIN_BODY: &str = r#"{"data":{"token":"abc","user":{"id":7}}}"#;

#[test]
fn test_login_token_and_test_result() {
    let runtime = test_runtime();
    let script = r#"
const json = pm.response.json();
pm.environment.set("authToken", json.data.token);
pm.test("has id", function () {
    pm.expect(json.data.user.id === 7).to.be.true;
});
"#;

    let result = runtime.run_test_script(script, &login_request(), &json_response(200, LOGIN_BODY));

    assert!(result.success, "script failed: {:?}", result.error);
    assert_eq!(
        runtime
            .variables()
            .get("authToken", Some(VariableScope::Environment))
            .as_deref(),
        Some("abc")
    );
    assert_eq!(result.test_results.len(), 1);
    assert_eq!(result.test_results[0].name, "has id");
    assert!(result.test_results[0].passed);
}

#[test]
fn test_login_token_and_test_result_groovy() {
    let runtime = test_runtime().with_language(ScriptLanguage::Groovy);
    let script = r#"
def json = pm.response.json()
pm.environment.set("authToken", json.data.token)
test("has id") {
    assert json.data.user.id == 7
}
"#;

    let result = runtime.run_test_script(script, &login_request(), &json_response(200, LOGIN_BODY));

    assert!(result.success, "script failed: {:?}", result.error);
    assert_eq!(result.passed_count(), 1);
    assert_eq!(result.test_results[0].name, "has id");
    assert_eq!(runtime.variables().get("authToken", None).as_deref(), Some("abc"));
}

#[test]
fn test_request_chaining_through_substitution() {
    let runtime = test_runtime();
    let login = runtime.run_test_script(
        "pm.extractJson('$.data.token', 'authToken')",
        &login_request(),
        &json_response(200, LOGIN_BODY),
    );
    assert!(login.success, "script failed: {:?}", login.error);

    let profile = RequestSnapshot::new(HttpMethod::GET, "https://api.example.com/profile")
        .with_header("Authorization", "Bearer {{authToken}}");
    let substituted = runtime.substitute_request(&profile);

    assert!(substituted.warnings.is_empty());
    assert_eq!(substituted.request.header("Authorization"), Some("Bearer abc"));

    let history = runtime.history().get_history(Some("authToken"), None);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].source, ChangeSource::Script);
    assert_eq!(history[0].new_value.as_deref(), Some("abc"));
}

#[test]
fn test_scope_precedence_fallback() {
    let store = VariableStore::new();
    store.set("host", "global.example.com", VariableScope::Global).unwrap();
    store.set("host", "env.example.com", VariableScope::Environment).unwrap();
    store.set("host", "collection.example.com", VariableScope::Collection).unwrap();
    store.set("host", "request.example.com", VariableScope::Request).unwrap();

    assert_eq!(store.get("host", None).as_deref(), Some("request.example.com"));
    store.delete("host", VariableScope::Request);
    assert_eq!(store.get("host", None).as_deref(), Some("collection.example.com"));
    store.delete("host", VariableScope::Collection);
    assert_eq!(store.get("host", None).as_deref(), Some("env.example.com"));
    store.delete("host", VariableScope::Environment);
    assert_eq!(store.get("host", None).as_deref(), Some("global.example.com"));
    store.delete("host", VariableScope::Global);
    assert_eq!(store.get("host", None), None);
}

#[test]
fn test_timeout_keeps_earlier_mutations() {
    let store = Arc::new(VariableStore::new());
    let executor = SandboxExecutor::with_config(&ScriptingConfig {
        script_timeout: 200,
        ..ScriptingConfig::default()
    });
    let handle = VariableHandle::new(store.clone(), ChangeSource::Script);

    let started = Instant::now();
    let result = executor.execute(
        "pm.globals.set('stage', 'started')\nconsole.log('spinning')\nlet n = 0\nwhile (true) { n += 1 }",
        ScriptContext::pre_request(login_request(), handle),
    );

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("timeout"));
    assert_eq!(result.logs, vec!["spinning"]);
    assert!(started.elapsed() < Duration::from_millis(1500));
    assert_eq!(
        store.get("stage", Some(VariableScope::Global)).as_deref(),
        Some("started")
    );
}

#[test]
fn test_assertion_semantics() {
    let runtime = test_runtime();
    let script = r#"
pm.test("above", () => { expect(5).to.be.above(1) })
pm.test("below", () => { expect(5).to.be.below(10) })
pm.test("eql", () => { expect([1, 2]).to.eql([1, 2]) })
pm.test("equal", () => { expect([1, 2]).to.equal([1, 2]) })
pm.test("deep equal", () => { expect({ a: [1] }).to.deep.equal({ a: [1] }) })
pm.test("not", () => { expect("abc").to.not.include("z") })
"#;

    let result = runtime.run_test_script(script, &login_request(), &json_response(200, "{}"));

    assert!(result.success, "script failed: {:?}", result.error);
    let outcome: Vec<(&str, bool)> = result
        .test_results
        .iter()
        .map(|t| (t.name.as_str(), t.passed))
        .collect();
    assert_eq!(
        outcome,
        vec![
            ("above", true),
            ("below", true),
            ("eql", true),
            ("equal", false),
            ("deep equal", true),
            ("not", true),
        ]
    );
    assert!(!result.all_tests_passed());
}

#[test]
fn test_failing_test_does_not_stop_siblings() {
    let runtime = test_runtime();
    let script = r#"
pm.test("first", () => { throw new Error("broken") })
pm.test("second", () => { pm.expect(pm.response.code).to.equal(200) })
console.log("done")
"#;

    let result = runtime.run_test_script(script, &login_request(), &json_response(200, "{}"));

    assert!(result.success);
    assert_eq!(result.failed_count(), 1);
    assert_eq!(result.test_results[0].error.as_deref(), Some("broken"));
    assert!(result.test_results[1].passed);
    assert_eq!(result.logs, vec!["done"]);
}

#[test]
fn test_regex_extraction_examples() {
    assert_eq!(
        extract_with_regex("order-12345", r"\d+", Some(false)).unwrap().as_deref(),
        Some("12345")
    );
    assert_eq!(
        extract_with_regex("token: abc123", r"token: (\w+)", Some(true))
            .unwrap()
            .as_deref(),
        Some("abc123")
    );
}

#[test]
fn test_history_cap_evicts_oldest() {
    let cap = 10;
    let store = VariableStore::with_history(Arc::new(HistoryTracker::new(cap)), 5);
    for i in 0..=cap {
        store
            .set("counter", i.to_string(), VariableScope::Global)
            .unwrap();
    }

    let history = store.history().get_history(Some("counter"), None);
    assert_eq!(history.len(), cap);
    assert_eq!(history[0].new_value.as_deref(), Some("10"));
    assert!(history.iter().all(|e| e.new_value.as_deref() != Some("0")));
}

fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|fields| Value::Object(fields.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn test_json_path_round_trip(value in arb_json()) {
        let document = json!({"a": {"b": value.clone()}});
        let extracted = extract_from_json(&document.to_string(), "$.a.b").unwrap();
        prop_assert_eq!(extracted, Some(value));
    }

    #[test]
    fn test_set_then_get_round_trip(
        key in "[a-zA-Z_][a-zA-Z0-9_]{0,15}",
        value in "[^{}]{0,32}",
        scope_index in 0usize..4,
    ) {
        let scope = [
            VariableScope::Global,
            VariableScope::Environment,
            VariableScope::Collection,
            VariableScope::Request,
        ][scope_index];
        let store = VariableStore::new();
        store.set(&key, value.clone(), scope).unwrap();
        prop_assert_eq!(store.get(&key, Some(scope)), Some(value));
    }
}
