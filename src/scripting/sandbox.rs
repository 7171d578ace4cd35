//! Script execution sandbox.
//!
//! Every invocation gets a fresh interpreter with no file, network or
//! module access. The only capabilities a script sees are the `pm` object,
//! `console`, `JSON` and the pure helpers. The interpreter is dropped when
//! the invocation ends, so nothing leaks into the next run except writes
//! made through the variable handle.

use super::convert::dynamic_to_json;
use super::dialect;
use super::error::ScriptError;
use super::helpers::{self, Console, JsonApi, LogSink};
use super::pm::{self, PmApi};
use super::result::ScriptExecutionResult;
use super::{assertions, ScriptLanguage};
use crate::config::{get_config, ScriptingConfig};
use crate::models::{RequestSnapshot, ResponseSnapshot};
use crate::variables::VariableHandle;
use log::{debug, warn};
use rhai::module_resolvers::DummyModuleResolver;
use rhai::{Dynamic, Engine, Scope};
use serde_json::Value;
use std::fmt;
use std::time::{Duration, Instant};

/// How often (in interpreter operations) the wall clock is checked.
const CLOCK_CHECK_INTERVAL: u64 = 128;

/// When a script runs relative to its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    /// Before the request is sent; no response is available.
    PreRequest,
    /// After the response is received.
    Test,
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptKind::PreRequest => f.write_str("pre-request"),
            ScriptKind::Test => f.write_str("test"),
        }
    }
}

/// Everything a single invocation may touch.
#[derive(Debug, Clone)]
pub struct ScriptContext {
    pub request: RequestSnapshot,
    pub response: Option<ResponseSnapshot>,
    pub variables: VariableHandle,
    /// Syntax of the script; `None` uses the configured default.
    pub language: Option<ScriptLanguage>,
    pub kind: ScriptKind,
}

impl ScriptContext {
    pub fn pre_request(request: RequestSnapshot, variables: VariableHandle) -> Self {
        Self {
            request,
            response: None,
            variables,
            language: None,
            kind: ScriptKind::PreRequest,
        }
    }

    pub fn test(
        request: RequestSnapshot,
        response: ResponseSnapshot,
        variables: VariableHandle,
    ) -> Self {
        Self {
            request,
            response: Some(response),
            variables,
            language: None,
            kind: ScriptKind::Test,
        }
    }

    pub fn with_language(mut self, language: ScriptLanguage) -> Self {
        self.language = Some(language);
        self
    }
}

/// Runs scripts under the configured time and resource limits.
///
/// The executor holds only configuration and can be shared freely between
/// threads; concurrent invocations never share interpreter state.
#[derive(Debug, Clone)]
pub struct SandboxExecutor {
    config: ScriptingConfig,
}

impl Default for SandboxExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxExecutor {
    /// Creates an executor using the global configuration.
    pub fn new() -> Self {
        Self::with_config(&get_config())
    }

    pub fn with_config(config: &ScriptingConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &ScriptingConfig {
        &self.config
    }

    /// Executes `script` and reports its outcome.
    ///
    /// Never panics and never returns an error: failures are reported through
    /// `success = false` and `error`. Logs and test results recorded before a
    /// failure are kept, as are variable writes made before it.
    ///
    /// # Arguments
    ///
    /// * `script` - Source text in the context's language
    /// * `context` - Request, optional response and variable access for this run
    pub fn execute(&self, script: &str, context: ScriptContext) -> ScriptExecutionResult {
        let started = Instant::now();
        let kind = context.kind;
        let language = context.language.unwrap_or(self.config.language);
        debug!(
            "Running {} script ({}, {} bytes)",
            kind,
            language,
            script.len()
        );

        let logs = LogSink::new(self.config.max_log_entries);
        let pm = PmApi::new(
            context.request,
            context.response,
            context.variables,
            self.config.default_extraction_scope,
        );

        let outcome = self.run(script, language, &pm, &logs, started);
        let duration_ms = started.elapsed().as_millis() as u64;

        let (success, result, error) = match outcome {
            Ok(value) => (true, value, None),
            Err(err) => {
                if err.is_timeout() {
                    warn!(
                        "{} script exceeded the {}ms timeout",
                        kind, self.config.script_timeout
                    );
                } else {
                    debug!("{} script failed: {}", kind, err);
                }
                (false, None, Some(err.to_string()))
            }
        };

        let result = ScriptExecutionResult {
            success,
            result,
            error,
            logs: logs.take(),
            test_results: pm.tests().take(),
            duration_ms,
        };
        debug!(
            "{} script finished in {}ms: {} passed, {} failed",
            kind,
            duration_ms,
            result.passed_count(),
            result.failed_count()
        );
        result
    }

    fn run(
        &self,
        script: &str,
        language: ScriptLanguage,
        pm: &PmApi,
        logs: &LogSink,
        started: Instant,
    ) -> Result<Option<Value>, ScriptError> {
        let source = dialect::translate(script, language)?;
        let engine = self.build_engine(pm, logs, started);

        let ast = engine
            .compile(&source)
            .map_err(|err| ScriptError::from_parse(&err))?;
        let value = engine
            .eval_ast_with_scope::<Dynamic>(&mut Scope::new(), &ast)
            .map_err(|err| ScriptError::from_eval(&err))?;

        if value.is_unit() {
            Ok(None)
        } else {
            Ok(Some(dynamic_to_json(&value)))
        }
    }

    fn build_engine(&self, pm: &PmApi, logs: &LogSink, started: Instant) -> Engine {
        let mut engine = Engine::new();

        engine.set_module_resolver(DummyModuleResolver::new());
        engine.disable_symbol("eval");

        if self.config.max_operations > 0 {
            engine.set_max_operations(self.config.max_operations);
        }
        engine.set_max_call_levels(self.config.max_call_levels);
        engine.set_max_string_size(self.config.max_string_size);
        engine.set_max_array_size(self.config.max_array_size);
        engine.set_max_map_size(self.config.max_map_size);

        let budget = Duration::from_millis(self.config.script_timeout);
        engine.on_progress(move |ops| {
            if ops % CLOCK_CHECK_INTERVAL == 0 && started.elapsed() >= budget {
                Some(Dynamic::from("timeout"))
            } else {
                None
            }
        });

        helpers::register(&mut engine, logs);
        assertions::register(&mut engine);
        pm::register(&mut engine, pm);

        let pm = pm.clone();
        engine.on_var(move |name, index, context| {
            if index > 0 || context.scope().contains(name) {
                return Ok(None);
            }
            match name {
                "pm" => Ok(Some(Dynamic::from(pm.clone()))),
                "console" => Ok(Some(Dynamic::from(Console))),
                "JSON" => Ok(Some(Dynamic::from(JsonApi))),
                _ => Ok(None),
            }
        });

        engine
    }
}
