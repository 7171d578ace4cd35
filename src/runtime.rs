//! Entry points used by the request pipeline.
//!
//! [`ScriptRuntime`] ties together the variable store, the persisted
//! extraction rules and the script sandbox. The pipeline calls it at four
//! points in a request's life:
//!
//! 1. [`run_pre_request_script`](ScriptRuntime::run_pre_request_script) once the request is built
//! 2. [`substitute_request`](ScriptRuntime::substitute_request) right before it is sent
//! 3. [`apply_rules`](ScriptRuntime::apply_rules) when the response arrives
//! 4. [`run_test_script`](ScriptRuntime::run_test_script) before the response is shown

use crate::config::{get_config, ScriptingConfig};
use crate::history::{ChangeSource, HistoryTracker};
use crate::models::{RequestSnapshot, ResponseSnapshot};
use crate::rules::{extract_with_rules, RuleBatchReport, RuleStore};
use crate::scripting::{SandboxExecutor, ScriptContext, ScriptExecutionResult, ScriptLanguage};
use crate::variables::{substitute_request, SubstitutedRequest, VariableHandle, VariableStore};
use log::{debug, info};
use std::sync::Arc;

/// Scripting runtime shared by every request of a session.
///
/// Cloning is cheap; clones share the same store and rules.
#[derive(Debug, Clone)]
pub struct ScriptRuntime {
    variables: Arc<VariableStore>,
    rules: Arc<RuleStore>,
    executor: SandboxExecutor,
    language: Option<ScriptLanguage>,
}

impl Default for ScriptRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptRuntime {
    /// Creates a runtime from the global configuration.
    pub fn new() -> Self {
        Self::with_config(&get_config())
    }

    pub fn with_config(config: &ScriptingConfig) -> Self {
        Self::with_store(Arc::new(VariableStore::with_config(config)), config)
    }

    /// Creates a runtime around an existing variable store.
    pub fn with_store(variables: Arc<VariableStore>, config: &ScriptingConfig) -> Self {
        Self {
            variables,
            rules: Arc::new(RuleStore::new()),
            executor: SandboxExecutor::with_config(config),
            language: None,
        }
    }

    /// Replaces the rule set, e.g. one loaded from disk.
    pub fn with_rules(mut self, rules: RuleStore) -> Self {
        self.rules = Arc::new(rules);
        self
    }

    /// Script syntax used by both invocation points.
    pub fn with_language(mut self, language: ScriptLanguage) -> Self {
        self.language = Some(language);
        self
    }

    pub fn variables(&self) -> &Arc<VariableStore> {
        &self.variables
    }

    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    pub fn history(&self) -> &Arc<HistoryTracker> {
        self.variables.history()
    }

    fn handle(&self) -> VariableHandle {
        VariableHandle::new(self.variables.clone(), ChangeSource::Script)
    }

    fn context(&self, context: ScriptContext) -> ScriptContext {
        match self.language {
            Some(language) => context.with_language(language),
            None => context,
        }
    }

    /// Runs a script before `request` is sent.
    ///
    /// Any `pm.response` access fails with "response unavailable in
    /// pre-request context".
    pub fn run_pre_request_script(
        &self,
        script: &str,
        request: &RequestSnapshot,
    ) -> ScriptExecutionResult {
        debug!("Pre-request script for {} {}", request.method.as_str(), request.url);
        let context = self.context(ScriptContext::pre_request(request.clone(), self.handle()));
        self.executor.execute(script, context)
    }

    /// Runs a test script against the received `response`.
    pub fn run_test_script(
        &self,
        script: &str,
        request: &RequestSnapshot,
        response: &ResponseSnapshot,
    ) -> ScriptExecutionResult {
        debug!(
            "Test script for {} {} (status {})",
            request.method.as_str(),
            request.url,
            response.status
        );
        let context = self.context(ScriptContext::test(
            request.clone(),
            response.clone(),
            self.handle(),
        ));
        self.executor.execute(script, context)
    }

    /// Evaluates every enabled rule against `response`.
    pub fn apply_rules(&self, response: &ResponseSnapshot) -> RuleBatchReport {
        let rules = self.rules.enabled_rules();
        if rules.is_empty() {
            return RuleBatchReport::default();
        }
        let report = extract_with_rules(&self.variables, response, &rules);
        info!(
            "Applied {} extraction rules: {} succeeded, {} failed",
            rules.len(),
            report.success_count(),
            report.errors.len()
        );
        report
    }

    /// Replaces `{{name}}` tokens in the URL, headers and body of `request`.
    pub fn substitute_request(&self, request: &RequestSnapshot) -> SubstitutedRequest {
        substitute_request(
            request,
            self.variables.as_ref(),
            self.variables.substitution_depth(),
        )
    }
}
