//! The per-invocation `pm` object.
//!
//! A fresh [`PmApi`] is built for every script run and handed to the
//! interpreter through a variable resolver, so nothing is shared between
//! invocations except the variable store behind the handle.

use super::assertions::Expectation;
use super::convert::{dynamic_to_json, dynamic_to_string, json_to_dynamic};
use super::error::{error_message, is_fatal, ScriptError};
use super::result::TestResult;
use crate::extraction::{jsonpath, ExtractionEngine, ExtractionError, ExtractionTarget};
use crate::models::{Header, RequestSnapshot, ResponseSnapshot};
use crate::variables::{VarError, VariableHandle, VariableScope};
use log::debug;
use rhai::{Dynamic, Engine, EvalAltResult, FnPtr, ImmutableString, Map, NativeCallContext, INT};
use std::sync::{Arc, Mutex};

type HostResult<T> = Result<T, Box<EvalAltResult>>;

/// Test results collected during one invocation.
#[derive(Debug, Clone, Default)]
pub(crate) struct TestLog(Arc<Mutex<Vec<TestResult>>>);

impl TestLog {
    fn push(&self, result: TestResult) {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).push(result);
    }

    pub(crate) fn take(&self) -> Vec<TestResult> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(|p| p.into_inner()))
    }
}

/// Runs one test block, recording its outcome.
///
/// Failures inside the block are recorded and swallowed; timeouts and
/// resource limit errors are propagated so they still abort the script.
fn run_test(ctx: &NativeCallContext, tests: &TestLog, name: &str, f: &FnPtr) -> HostResult<()> {
    match f.call_within_context::<Dynamic>(ctx, ()) {
        Ok(_) => {
            debug!("test '{}' passed", name);
            tests.push(TestResult::passed(name));
            Ok(())
        }
        Err(err) if is_fatal(&err) => Err(err),
        Err(err) => {
            let message = error_message(&err);
            debug!("test '{}' failed: {}", name, message);
            tests.push(TestResult::failed(name, message));
            Ok(())
        }
    }
}

fn headers_map(headers: &[Header]) -> Map {
    headers
        .iter()
        .map(|h| (h.name.as_str().into(), Dynamic::from(h.value.clone())))
        .collect()
}

fn optional(value: Option<String>) -> Dynamic {
    value.map(Dynamic::from).unwrap_or(Dynamic::UNIT)
}

/// `pm.request`: read-only view of the outgoing request.
#[derive(Debug, Clone)]
pub(crate) struct RequestApi(Arc<RequestSnapshot>);

/// `pm.response`: read-only view of the received response.
#[derive(Debug, Clone)]
pub(crate) struct ResponseApi(Arc<ResponseSnapshot>);

impl ResponseApi {
    fn json(&self) -> HostResult<Dynamic> {
        serde_json::from_str::<serde_json::Value>(&self.0.body)
            .map(|value| json_to_dynamic(&value))
            .map_err(|e| {
                ScriptError::runtime(format!("Response body is not valid JSON: {}", e))
                    .into_rhai()
            })
    }
}

/// `pm.variables`, `pm.environment`, `pm.collectionVariables`, `pm.globals`.
#[derive(Debug, Clone)]
pub(crate) struct VariablesApi {
    handle: VariableHandle,
    /// `None` resolves by precedence.
    read_scope: Option<VariableScope>,
    write_scope: VariableScope,
}

impl VariablesApi {
    fn get(&self, key: &str) -> Dynamic {
        optional(self.handle.get(key, self.read_scope))
    }

    fn has(&self, key: &str) -> bool {
        self.handle.has(key, self.read_scope)
    }

    fn set(&self, key: &str, value: &Dynamic) -> HostResult<()> {
        self.handle
            .set(key, dynamic_to_string(value), self.write_scope)
            .map(|_| ())
            .map_err(var_error)
    }

    fn unset(&self, key: &str) -> HostResult<bool> {
        self.handle.unset(key, self.write_scope).map_err(var_error)
    }
}

fn var_error(err: VarError) -> Box<EvalAltResult> {
    match err {
        VarError::ReadOnlyScope(scope) => {
            ScriptError::PermissionDenied(format!("{} variables are read-only here", scope))
        }
        other => ScriptError::runtime(other.to_string()),
    }
    .into_rhai()
}

/// The `pm` capability object.
#[derive(Debug, Clone)]
pub(crate) struct PmApi {
    request: RequestApi,
    response: Option<ResponseApi>,
    handle: VariableHandle,
    tests: TestLog,
    extraction_scope: VariableScope,
}

impl PmApi {
    pub(crate) fn new(
        request: RequestSnapshot,
        response: Option<ResponseSnapshot>,
        handle: VariableHandle,
        extraction_scope: VariableScope,
    ) -> Self {
        Self {
            request: RequestApi(Arc::new(request)),
            response: response.map(|r| ResponseApi(Arc::new(r))),
            handle,
            tests: TestLog::default(),
            extraction_scope,
        }
    }

    pub(crate) fn tests(&self) -> &TestLog {
        &self.tests
    }

    fn response(&self) -> HostResult<ResponseApi> {
        self.response
            .clone()
            .ok_or_else(|| ScriptError::ResponseUnavailable.into_rhai())
    }

    fn scoped(&self, read_scope: Option<VariableScope>, write_scope: VariableScope) -> VariablesApi {
        VariablesApi {
            handle: self.handle.clone(),
            read_scope,
            write_scope,
        }
    }

    /// `jsonPath(obj, path)`: queries a value (or a JSON string) in place.
    fn json_path(&self, target: &Dynamic, path: &str) -> HostResult<Dynamic> {
        let root = if target.is_string() {
            let text = target.to_string();
            serde_json::from_str(&text).map_err(|e| {
                ScriptError::runtime(format!("jsonPath: input is not valid JSON: {}", e))
                    .into_rhai()
            })?
        } else {
            dynamic_to_json(target)
        };
        let found = jsonpath::select(&root, path)
            .map_err(|e| ScriptError::runtime(e.to_string()).into_rhai())?;
        Ok(found.map(|v| json_to_dynamic(&v)).unwrap_or(Dynamic::UNIT))
    }

    /// `extractJson(path[, name])`: queries the response body and, with a
    /// name, stores the value in the default extraction scope.
    ///
    /// An unparsable body yields unit; a malformed path is an error.
    fn extract_json(&self, path: &str, variable: Option<&str>) -> HostResult<Dynamic> {
        let response = self.response()?;
        let target = match variable {
            Some(name) => {
                if !self.handle.can_write(self.extraction_scope) {
                    return Err(var_error(VarError::ReadOnlyScope(self.extraction_scope)));
                }
                Some(ExtractionTarget::new(name, self.extraction_scope))
            }
            None => None,
        };

        let engine = ExtractionEngine::with_source(self.handle.store().clone(), self.handle.source());
        match engine.extract_from_json(&response.0.body, path, target.as_ref()) {
            Ok(found) => Ok(found.map(|v| json_to_dynamic(&v)).unwrap_or(Dynamic::UNIT)),
            Err(ExtractionError::Parse(message)) => {
                debug!("extractJson: {}", message);
                Ok(Dynamic::UNIT)
            }
            Err(err) => Err(ScriptError::runtime(err.to_string()).into_rhai()),
        }
    }
}

fn register_request(engine: &mut Engine) {
    engine.register_type_with_name::<RequestApi>("Request");
    engine.register_get("url", |r: &mut RequestApi| r.0.url.clone());
    engine.register_get("method", |r: &mut RequestApi| r.0.method.as_str().to_string());
    engine.register_get("headers", |r: &mut RequestApi| headers_map(&r.0.headers));
    engine.register_get("body", |r: &mut RequestApi| optional(r.0.body.clone()));
    engine.register_fn("header", |r: RequestApi, name: &str| {
        optional(r.0.header(name).map(str::to_string))
    });
    engine.register_fn("query", |r: RequestApi, name: &str| optional(r.0.query_param(name)));
}

fn register_response(engine: &mut Engine) {
    engine.register_type_with_name::<ResponseApi>("Response");
    engine.register_get("code", |r: &mut ResponseApi| r.0.status as INT);
    engine.register_get("status", |r: &mut ResponseApi| r.0.status as INT);
    engine.register_get("statusText", |r: &mut ResponseApi| r.0.status_text.clone());
    engine.register_get("responseTime", |r: &mut ResponseApi| r.0.response_time as INT);
    engine.register_get("responseSize", |r: &mut ResponseApi| r.0.response_size as INT);
    engine.register_get("headers", |r: &mut ResponseApi| headers_map(&r.0.headers));
    engine.register_get("body", |r: &mut ResponseApi| r.0.body.clone());
    engine.register_fn("header", |r: ResponseApi, name: &str| {
        optional(r.0.header(name).map(str::to_string))
    });
    engine.register_fn("json", |r: ResponseApi| r.json());
    engine.register_fn("text", |r: ResponseApi| r.0.body.clone());
}

fn register_variables(engine: &mut Engine) {
    engine.register_type_with_name::<VariablesApi>("Variables");
    engine.register_fn("get", |v: VariablesApi, key: &str| v.get(key));
    engine.register_fn("has", |v: VariablesApi, key: &str| v.has(key));
    engine.register_fn("set", |v: VariablesApi, key: &str, value: Dynamic| v.set(key, &value));
    engine.register_fn("unset", |v: VariablesApi, key: &str| v.unset(key));
}

/// Registers the `pm` API types and the top-level `test`, `jsonPath` and
/// `extractJson` functions bound to `pm`.
pub(crate) fn register(engine: &mut Engine, pm: &PmApi) {
    register_request(engine);
    register_response(engine);
    register_variables(engine);

    engine.register_type_with_name::<PmApi>("PM");
    engine.register_get("request", |pm: &mut PmApi| pm.request.clone());
    engine.register_get("response", |pm: &mut PmApi| pm.response());
    engine.register_get("variables", |pm: &mut PmApi| {
        pm.scoped(None, VariableScope::Request)
    });
    engine.register_get("environment", |pm: &mut PmApi| {
        pm.scoped(Some(VariableScope::Environment), VariableScope::Environment)
    });
    engine.register_get("collectionVariables", |pm: &mut PmApi| {
        pm.scoped(Some(VariableScope::Collection), VariableScope::Collection)
    });
    engine.register_get("globals", |pm: &mut PmApi| {
        pm.scoped(Some(VariableScope::Global), VariableScope::Global)
    });

    engine.register_fn(
        "test",
        |ctx: NativeCallContext, pm: PmApi, name: ImmutableString, f: FnPtr| {
            run_test(&ctx, &pm.tests, &name, &f)
        },
    );
    let tests = pm.tests.clone();
    engine.register_fn(
        "test",
        move |ctx: NativeCallContext, name: ImmutableString, f: FnPtr| {
            run_test(&ctx, &tests, &name, &f)
        },
    );

    engine.register_fn("expect", |_: PmApi, value: Dynamic| Expectation::new(value));
    engine.register_fn("expectBound", |_: PmApi, value: Dynamic, name: &str| {
        Expectation::bound(value, name)
    });

    engine.register_fn("jsonPath", |pm: PmApi, target: Dynamic, path: &str| {
        pm.json_path(&target, path)
    });
    let bound = pm.clone();
    engine.register_fn("jsonPath", move |target: Dynamic, path: &str| {
        bound.json_path(&target, path)
    });

    engine.register_fn("extractJson", |pm: PmApi, path: &str| pm.extract_json(path, None));
    engine.register_fn("extractJson", |pm: PmApi, path: &str, name: &str| {
        pm.extract_json(path, Some(name))
    });
    let bound = pm.clone();
    engine.register_fn("extractJson", move |path: &str| bound.extract_json(path, None));
    let bound = pm.clone();
    engine.register_fn("extractJson", move |path: &str, name: &str| {
        bound.extract_json(path, Some(name))
    });
}
