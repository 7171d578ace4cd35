//! Variable data model: scopes, value types and the variable record itself.

use super::VarError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Placeholder shown instead of a secret value on every export or log surface.
pub const SECRET_MASK: &str = "******";

/// A named bucket of variables.
///
/// Unscoped lookups walk [`VariableScope::PRECEDENCE`] and return the first
/// enabled match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableScope {
    /// Process-wide variables shared by every request.
    Global,
    /// Variables of the active environment (dev, staging, production...).
    Environment,
    /// Variables shared by every request of a collection.
    Collection,
    /// Variables local to a single request execution.
    Request,
}

impl VariableScope {
    /// Resolution order for unscoped lookups, most specific first.
    pub const PRECEDENCE: [VariableScope; 4] = [
        VariableScope::Request,
        VariableScope::Collection,
        VariableScope::Environment,
        VariableScope::Global,
    ];

    /// Returns the lowercase name of the scope.
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableScope::Global => "global",
            VariableScope::Environment => "environment",
            VariableScope::Collection => "collection",
            VariableScope::Request => "request",
        }
    }

    /// Stable slot index used by the store's per-scope maps.
    pub(crate) fn index(&self) -> usize {
        match self {
            VariableScope::Global => 0,
            VariableScope::Environment => 1,
            VariableScope::Collection => 2,
            VariableScope::Request => 3,
        }
    }
}

impl fmt::Display for VariableScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariableScope {
    type Err = VarError;

    /// Parses a scope name. Unknown names are a configuration error.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" | "globals" => Ok(VariableScope::Global),
            "environment" | "env" => Ok(VariableScope::Environment),
            "collection" | "collectionvariables" => Ok(VariableScope::Collection),
            "request" | "local" => Ok(VariableScope::Request),
            _ => Err(VarError::UnknownScope(s.to_string())),
        }
    }
}

/// Declared type of a variable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    /// Plain text.
    #[default]
    String,
    /// Numeric value stored in its textual form.
    Number,
    /// `true` / `false`.
    Boolean,
    /// Sensitive text, masked on every export and log surface.
    Secret,
}

impl VariableType {
    /// Infers `number` or `boolean` from a textual value, `string` otherwise.
    pub fn infer(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed == "true" || trimmed == "false" {
            VariableType::Boolean
        } else if !trimmed.is_empty() && trimmed.parse::<f64>().map(f64::is_finite).unwrap_or(false) {
            VariableType::Number
        } else {
            VariableType::String
        }
    }

    /// Returns the lowercase name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableType::String => "string",
            VariableType::Number => "number",
            VariableType::Boolean => "boolean",
            VariableType::Secret => "secret",
        }
    }
}

/// A single variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    /// Variable name; unique within its scope.
    pub key: String,

    /// Value in textual form.
    pub value: String,

    /// Declared value type.
    #[serde(rename = "type", default)]
    pub var_type: VariableType,

    /// Scope the variable lives in.
    pub scope: VariableScope,

    /// Disabled variables are skipped by lookups and substitution.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Optional free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl Variable {
    /// Creates an enabled string variable.
    pub fn new(key: impl Into<String>, value: impl Into<String>, scope: VariableScope) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            var_type: VariableType::String,
            scope,
            enabled: true,
            description: None,
        }
    }

    /// Sets the type, builder style.
    pub fn with_type(mut self, var_type: VariableType) -> Self {
        self.var_type = var_type;
        self
    }

    /// Sets the description, builder style.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Checks if the variable holds a secret.
    pub fn is_secret(&self) -> bool {
        self.var_type == VariableType::Secret
    }

    /// Value safe to show in logs, history and exports.
    pub fn display_value(&self) -> &str {
        if self.is_secret() {
            SECRET_MASK
        } else {
            &self.value
        }
    }

    /// Copy of the variable with the value masked when it is a secret.
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        if copy.is_secret() {
            copy.value = SECRET_MASK.to_string();
        }
        copy
    }
}

/// Validates a variable key.
///
/// Keys must be non-empty, must not contain whitespace only, and must not
/// contain substitution braces.
pub fn validate_key(key: &str) -> Result<(), VarError> {
    if key.trim().is_empty() {
        return Err(VarError::InvalidKey("variable key must not be empty".to_string()));
    }
    if key.contains("{{") || key.contains("}}") {
        return Err(VarError::InvalidKey(format!(
            "variable key '{}' must not contain '{{{{' or '}}}}'",
            key
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_from_str() {
        assert_eq!("global".parse::<VariableScope>().unwrap(), VariableScope::Global);
        assert_eq!("Environment".parse::<VariableScope>().unwrap(), VariableScope::Environment);
        assert_eq!("env".parse::<VariableScope>().unwrap(), VariableScope::Environment);
        assert_eq!("collection".parse::<VariableScope>().unwrap(), VariableScope::Collection);
        assert_eq!("local".parse::<VariableScope>().unwrap(), VariableScope::Request);
    }

    #[test]
    fn test_unknown_scope_is_error() {
        let err = "session".parse::<VariableScope>().unwrap_err();
        assert_eq!(err, VarError::UnknownScope("session".to_string()));
    }

    #[test]
    fn test_precedence_order() {
        assert_eq!(
            VariableScope::PRECEDENCE,
            [
                VariableScope::Request,
                VariableScope::Collection,
                VariableScope::Environment,
                VariableScope::Global
            ]
        );
    }

    #[test]
    fn test_secret_masking() {
        let secret = Variable::new("apiKey", "s3cr3t", VariableScope::Environment)
            .with_type(VariableType::Secret);
        assert_eq!(secret.display_value(), SECRET_MASK);
        assert_eq!(secret.masked().value, SECRET_MASK);
        assert_eq!(secret.value, "s3cr3t");

        let plain = Variable::new("host", "example.com", VariableScope::Global);
        assert_eq!(plain.display_value(), "example.com");
    }

    #[test]
    fn test_variable_serialization() {
        let variable = Variable::new("count", "3", VariableScope::Collection)
            .with_type(VariableType::Number)
            .with_description("items per page");

        let json = serde_json::to_string(&variable).unwrap();
        assert!(json.contains("\"type\":\"number\""));
        assert!(json.contains("\"scope\":\"collection\""));

        let parsed: Variable =
            serde_json::from_str(r#"{"key": "a", "value": "b", "scope": "global"}"#).unwrap();
        assert!(parsed.enabled);
        assert_eq!(parsed.var_type, VariableType::String);
    }

    #[test]
    fn test_infer_type() {
        assert_eq!(VariableType::infer("42"), VariableType::Number);
        assert_eq!(VariableType::infer("-1.5"), VariableType::Number);
        assert_eq!(VariableType::infer("true"), VariableType::Boolean);
        assert_eq!(VariableType::infer("abc"), VariableType::String);
        assert_eq!(VariableType::infer(""), VariableType::String);
        assert_eq!(VariableType::infer("NaN"), VariableType::String);
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("authToken").is_ok());
        assert!(validate_key("data.token").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("   ").is_err());
        assert!(validate_key("{{nested}}").is_err());
    }
}
