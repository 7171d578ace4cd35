//! Extraction rule model and batch report types.

use super::RuleError;
use crate::config::get_config;
use crate::variables::VariableScope;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Part of the response a rule reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSource {
    #[default]
    Body,
    Headers,
}

/// Extractor a rule dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionMethod {
    #[serde(rename = "jsonpath", alias = "jsonPath", alias = "JSONPath")]
    JsonPath,
    #[serde(rename = "xpath", alias = "xPath", alias = "XPath")]
    XPath,
    #[serde(rename = "header")]
    Header,
    #[serde(rename = "regex")]
    Regex,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::JsonPath => "jsonpath",
            ExtractionMethod::XPath => "xpath",
            ExtractionMethod::Header => "header",
            ExtractionMethod::Regex => "regex",
        }
    }

    /// Source a rule of this method reads when none is given.
    pub fn default_source(&self) -> RuleSource {
        match self {
            ExtractionMethod::Header => RuleSource::Headers,
            _ => RuleSource::Body,
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted, reusable extraction configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRule {
    /// Unique id; generated when empty or missing.
    #[serde(default)]
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// Disabled rules are skipped during evaluation.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Part of the response the rule reads.
    #[serde(default)]
    pub source: RuleSource,

    /// Extractor to use.
    pub method: ExtractionMethod,

    /// JSONPath, XML path, header name or regex, depending on `method`.
    pub pattern: String,

    /// Variable the extracted value is written to.
    pub variable_name: String,

    /// Scope the variable is written to.
    #[serde(default = "default_target_scope")]
    pub target_scope: VariableScope,

    /// For regex rules: return group 1 instead of the whole match.
    /// Inferred from the pattern when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_capture_group: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_target_scope() -> VariableScope {
    get_config().default_extraction_scope
}

impl ExtractionRule {
    /// Creates an enabled rule with a fresh id, the method's default source
    /// and the configured default scope.
    pub fn new(
        name: impl Into<String>,
        method: ExtractionMethod,
        pattern: impl Into<String>,
        variable_name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            enabled: true,
            source: method.default_source(),
            method,
            pattern: pattern.into(),
            variable_name: variable_name.into(),
            target_scope: default_target_scope(),
            has_capture_group: None,
            description: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_source(mut self, source: RuleSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_scope(mut self, scope: VariableScope) -> Self {
        self.target_scope = scope;
        self
    }

    pub fn with_capture_group(mut self, has_capture_group: bool) -> Self {
        self.has_capture_group = Some(has_capture_group);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Assigns a fresh id if the rule has none.
    pub fn ensure_id(&mut self) {
        if self.id.trim().is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
    }

    /// Checks the fields a rule needs to be stored.
    ///
    /// Regex syntax is not checked; a bad pattern surfaces as a per-rule
    /// error when the rule is evaluated.
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.name.trim().is_empty() {
            return Err(RuleError::Validation("name must not be empty".to_string()));
        }
        if self.pattern.trim().is_empty() {
            return Err(RuleError::Validation(format!(
                "rule '{}': pattern must not be empty",
                self.name
            )));
        }
        if !is_identifier(&self.variable_name) {
            return Err(RuleError::Validation(format!(
                "rule '{}': variable name '{}' must match [A-Za-z_][A-Za-z0-9_]*",
                self.name, self.variable_name
            )));
        }
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Outcome of one evaluated rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedRule {
    pub rule_id: String,
    pub rule_name: String,
    pub variable_name: String,
    /// Stored value on success.
    pub value: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A rule that failed during a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleFailure {
    pub rule_id: String,
    pub rule_name: String,
    pub message: String,
}

/// Result of evaluating a rule batch against one response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleBatchReport {
    /// Every evaluated (enabled) rule, in declaration order.
    pub applied: Vec<AppliedRule>,
    /// The failed subset, in declaration order.
    pub errors: Vec<RuleFailure>,
}

impl RuleBatchReport {
    pub fn success_count(&self) -> usize {
        self.applied.iter().filter(|a| a.success).count()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
