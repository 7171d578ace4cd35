//! Benchmarks for sandboxed script execution.
//!
//! Every execution builds a fresh engine, so these numbers include engine
//! setup, dialect translation and compilation as well as evaluation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rest_client_scripting::config::ScriptingConfig;
use rest_client_scripting::history::ChangeSource;
use rest_client_scripting::models::{HttpMethod, RequestSnapshot, ResponseSnapshot};
use rest_client_scripting::scripting::dialect::translate;
use rest_client_scripting::scripting::{SandboxExecutor, ScriptContext};
use rest_client_scripting::variables::{VariableHandle, VariableStore};
use rest_client_scripting::ScriptLanguage;
use std::sync::Arc;

const PRE_REQUEST: &str = r#"
const trace = "bench-" + pm.request.method
pm.environment.set("traceId", trace)
console.log(trace)
"#;

const JS_TESTS: &str = r#"
const json = pm.response.json()
pm.environment.set("authToken", json.data.token)
pm.test("status is 200", () => { pm.expect(pm.response.code).to.equal(200) })
pm.test("has user", function () {
    pm.expect(json.data.user.id).to.equal(7)
    pm.expect(json.data.roles).to.include("admin")
})
"#;

const GROOVY_TESTS: &str = r#"
def json = pm.response.json()
pm.environment.set("authToken", json.data.token)
test("has user") {
    assert json.data.user.id == 7
    assert json.data.roles.contains("admin")
}
"#;

fn request() -> RequestSnapshot {
    RequestSnapshot::new(HttpMethod::POST, "https://api.example.com/auth/login")
        .with_header("Content-Type", "application/json")
}

fn response() -> ResponseSnapshot {
    ResponseSnapshot::new(200, "OK")
        .with_header("Content-Type", "application/json")
        .with_body(r#"{"data":{"token":"abc","user":{"id":7},"roles":["admin","dev"]}}"#)
}

fn handle() -> VariableHandle {
    VariableHandle::new(Arc::new(VariableStore::new()), ChangeSource::Script)
}

fn bench_pre_request(c: &mut Criterion) {
    let executor = SandboxExecutor::with_config(&ScriptingConfig::default());

    c.bench_function("execute_pre_request", |b| {
        b.iter(|| {
            executor.execute(
                black_box(PRE_REQUEST),
                ScriptContext::pre_request(request(), handle()),
            )
        })
    });
}

fn bench_test_scripts(c: &mut Criterion) {
    let executor = SandboxExecutor::with_config(&ScriptingConfig::default());
    let mut group = c.benchmark_group("execute_test_script");

    for (language, script) in [
        (ScriptLanguage::JavaScript, JS_TESTS),
        (ScriptLanguage::Groovy, GROOVY_TESTS),
    ] {
        group.bench_with_input(
            BenchmarkId::from_parameter(language),
            &script,
            |b, script| {
                b.iter(|| {
                    let context = ScriptContext::test(request(), response(), handle())
                        .with_language(language);
                    executor.execute(black_box(script), context)
                })
            },
        );
    }

    group.finish();
}

fn bench_translate(c: &mut Criterion) {
    let mut group = c.benchmark_group("translate");

    for (language, script) in [
        (ScriptLanguage::JavaScript, JS_TESTS),
        (ScriptLanguage::Groovy, GROOVY_TESTS),
    ] {
        group.bench_with_input(
            BenchmarkId::from_parameter(language),
            &script,
            |b, script| b.iter(|| translate(black_box(script), language)),
        );
    }

    group.finish();
}

fn bench_loop_heavy(c: &mut Criterion) {
    let executor = SandboxExecutor::with_config(&ScriptingConfig::default());
    let script = "let total = 0\nfor (let i = 0; i < 10000; i++) { total += i }\ntotal";

    c.bench_function("execute_loop_10k", |b| {
        b.iter(|| {
            executor.execute(
                black_box(script),
                ScriptContext::pre_request(request(), handle()),
            )
        })
    });
}

criterion_group!(
    benches,
    bench_pre_request,
    bench_test_scripts,
    bench_translate,
    bench_loop_heavy
);

criterion_main!(benches);
