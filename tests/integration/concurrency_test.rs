//! Concurrency tests
//!
//! One runtime is shared by every in-flight request. These tests run scripts
//! and rule batches from several threads at once and check that no write is
//! lost and the history stays consistent.

use super::{json_response, login_request, test_runtime};
use rest_client_scripting::config::{reset_config, update_config};
use rest_client_scripting::history::ChangeSource;
use rest_client_scripting::rules::{ExtractionMethod, ExtractionRule};
use rest_client_scripting::variables::VariableScope;
use rest_client_scripting::ScriptRuntime;
use serial_test::serial;
use std::thread;

const WORKERS: usize = 8;
const ROUNDS: usize = 10;

#[test]
fn test_concurrent_scripts_keep_every_write() {
    let runtime = test_runtime();

    thread::scope(|s| {
        for worker in 0..WORKERS {
            let runtime = runtime.clone();
            s.spawn(move || {
                for round in 0..ROUNDS {
                    let script = format!(
                        "pm.environment.set('worker_{w}', '{r}')\npm.globals.set('last', '{w}-{r}')",
                        w = worker,
                        r = round
                    );
                    let result = runtime.run_pre_request_script(&script, &login_request());
                    assert!(result.success, "worker {} failed: {:?}", worker, result.error);
                }
            });
        }
    });

    let vars = runtime.variables();
    for worker in 0..WORKERS {
        let key = format!("worker_{}", worker);
        assert_eq!(
            vars.get(&key, Some(VariableScope::Environment)).as_deref(),
            Some("9")
        );
        assert_eq!(runtime.history().get_history(Some(key.as_str()), None).len(), ROUNDS);
    }

    let last = vars.get("last", Some(VariableScope::Global)).unwrap();
    assert!(last.ends_with("-9"), "unexpected last value {}", last);

    let last_history = runtime.history().get_history(Some("last"), None);
    assert_eq!(last_history.len(), WORKERS * ROUNDS);
    assert!(last_history.iter().all(|e| e.source == ChangeSource::Script));
    assert_eq!(last_history[0].new_value.as_deref(), Some(last.as_str()));
}

#[test]
fn test_history_sequence_is_strictly_ordered_across_threads() {
    let runtime = test_runtime();

    thread::scope(|s| {
        for worker in 0..WORKERS {
            let store = runtime.variables().clone();
            s.spawn(move || {
                for round in 0..ROUNDS {
                    store
                        .set(&format!("k{}", worker), round.to_string(), VariableScope::Collection)
                        .unwrap();
                }
            });
        }
    });

    let history = runtime.history().get_history(None, None);
    assert_eq!(history.len(), WORKERS * ROUNDS);
    assert!(history.windows(2).all(|pair| pair[0].sequence > pair[1].sequence));
}

#[test]
fn test_rules_and_scripts_interleave() {
    let runtime = test_runtime();
    runtime
        .rules()
        .add(
            ExtractionRule::new("token", ExtractionMethod::JsonPath, "$.token", "token")
                .with_scope(VariableScope::Environment),
        )
        .unwrap();

    thread::scope(|s| {
        for worker in 0..WORKERS {
            let runtime = runtime.clone();
            s.spawn(move || {
                let body = format!(r#"{{"token":"t{}"}}"#, worker);
                let response = json_response(200, &body);
                let report = runtime.apply_rules(&response);
                assert!(!report.has_errors());

                let result = runtime.run_test_script(
                    "pm.test('token present', () => { pm.expect(pm.environment.get('token')).to.be.a('string') })",
                    &login_request(),
                    &response,
                );
                assert!(result.all_tests_passed(), "{:?}", result.test_results);
            });
        }
    });

    let token = runtime.variables().get("token", None).unwrap();
    assert!(token.starts_with('t'));
    assert_eq!(runtime.history().get_history(Some("token"), None).len(), WORKERS);
}

#[test]
#[serial]
fn test_runtime_reads_global_configuration() {
    reset_config();
    update_config(|config| config.max_log_entries = 2);

    let runtime = ScriptRuntime::new();
    let result = runtime.run_pre_request_script(
        "for (let i = 0; i < 5; i++) { console.log(i) }",
        &login_request(),
    );
    reset_config();

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.logs.len(), 3);
    assert_eq!(result.logs[0], "0");
    assert!(result.logs[2].contains("3 more"));
}
