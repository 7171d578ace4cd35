//! Configuration schema for the scripting runtime.
//!
//! This module defines the configuration structure and validation logic for all
//! user-configurable settings of the script sandbox, variable substitution,
//! history tracking and extraction.

use crate::scripting::ScriptLanguage;
use crate::variables::VariableScope;
use serde::{Deserialize, Serialize};

/// Upper bound accepted for `substitutionDepth`.
pub const MAX_SUBSTITUTION_DEPTH: usize = 32;

/// Main configuration structure for the scripting runtime.
///
/// All settings can be configured via the settings JSON under the
/// "rest-client-scripting" key. Missing settings fall back to sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptingConfig {
    /// Wall-clock budget for a single script invocation in milliseconds.
    ///
    /// A script still running when the budget is spent is aborted and reported
    /// with `error = "timeout"`. Defaults to 5000ms.
    ///
    /// Must be greater than 0.
    #[serde(default = "default_script_timeout")]
    pub script_timeout: u64,

    /// Maximum number of interpreter operations per invocation.
    ///
    /// 0 means unlimited; the timeout still applies.
    #[serde(default)]
    pub max_operations: u64,

    /// Maximum function call nesting depth inside a script. Defaults to 64.
    #[serde(default = "default_max_call_levels")]
    pub max_call_levels: usize,

    /// Maximum length of any string built by a script, in bytes. Defaults to 1 MiB.
    #[serde(default = "default_max_string_size")]
    pub max_string_size: usize,

    /// Maximum number of elements in a script array. Defaults to 100 000.
    #[serde(default = "default_max_collection_size")]
    pub max_array_size: usize,

    /// Maximum number of properties in a script object. Defaults to 100 000.
    #[serde(default = "default_max_collection_size")]
    pub max_map_size: usize,

    /// Maximum number of console lines kept per invocation. Defaults to 1000.
    #[serde(default = "default_max_log_entries")]
    pub max_log_entries: usize,

    /// Maximum nesting depth for `{{variable}}` substitution. Defaults to 5.
    ///
    /// Must be within 1..=32.
    #[serde(default = "default_substitution_depth")]
    pub substitution_depth: usize,

    /// Maximum number of history entries kept per variable. Defaults to 1000.
    ///
    /// Must be greater than 0.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Scope written by `pm.extractJson(path, name)`. Defaults to environment.
    #[serde(default = "default_extraction_scope")]
    pub default_extraction_scope: VariableScope,

    /// Front-end syntax used when the caller does not pick one.
    #[serde(default)]
    pub language: ScriptLanguage,
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            script_timeout: default_script_timeout(),
            max_operations: 0,
            max_call_levels: default_max_call_levels(),
            max_string_size: default_max_string_size(),
            max_array_size: default_max_collection_size(),
            max_map_size: default_max_collection_size(),
            max_log_entries: default_max_log_entries(),
            substitution_depth: default_substitution_depth(),
            history_limit: default_history_limit(),
            default_extraction_scope: default_extraction_scope(),
            language: ScriptLanguage::default(),
        }
    }
}

impl ScriptingConfig {
    /// Validates the configuration and returns errors if any settings are invalid.
    ///
    /// # Returns
    ///
    /// `Ok(())` if all settings are valid, or `Err` with a descriptive error message.
    pub fn validate(&self) -> Result<(), String> {
        if self.script_timeout == 0 {
            return Err("scriptTimeout must be greater than 0".to_string());
        }

        if self.history_limit == 0 {
            return Err("historyLimit must be greater than 0".to_string());
        }

        if self.substitution_depth == 0 || self.substitution_depth > MAX_SUBSTITUTION_DEPTH {
            return Err(format!(
                "substitutionDepth must be between 1 and {}",
                MAX_SUBSTITUTION_DEPTH
            ));
        }

        if self.max_call_levels == 0 {
            return Err("maxCallLevels must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Returns the script timeout as a `std::time::Duration`.
    pub fn timeout_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.script_timeout)
    }

    /// Merges this configuration with another, using values from `other` where present.
    ///
    /// # Arguments
    ///
    /// * `other` - Configuration to merge with (takes precedence)
    pub fn merge(&self, other: &ScriptingConfig) -> Self {
        Self {
            script_timeout: other.script_timeout,
            max_operations: other.max_operations,
            max_call_levels: other.max_call_levels,
            max_string_size: other.max_string_size,
            max_array_size: other.max_array_size,
            max_map_size: other.max_map_size,
            max_log_entries: other.max_log_entries,
            substitution_depth: other.substitution_depth,
            history_limit: other.history_limit,
            default_extraction_scope: other.default_extraction_scope,
            language: other.language,
        }
    }
}

// Default value functions for serde

fn default_script_timeout() -> u64 {
    5000
}

fn default_max_call_levels() -> usize {
    64
}

fn default_max_string_size() -> usize {
    1024 * 1024
}

fn default_max_collection_size() -> usize {
    100_000
}

fn default_max_log_entries() -> usize {
    1000
}

fn default_substitution_depth() -> usize {
    5
}

fn default_history_limit() -> usize {
    1000
}

fn default_extraction_scope() -> VariableScope {
    VariableScope::Environment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScriptingConfig::default();
        assert_eq!(config.script_timeout, 5000);
        assert_eq!(config.max_operations, 0);
        assert_eq!(config.substitution_depth, 5);
        assert_eq!(config.history_limit, 1000);
        assert_eq!(config.default_extraction_scope, VariableScope::Environment);
        assert_eq!(config.language, ScriptLanguage::JavaScript);
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(ScriptingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let config = ScriptingConfig {
            script_timeout: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate().unwrap_err(),
            "scriptTimeout must be greater than 0"
        );
    }

    #[test]
    fn test_config_validation_substitution_depth_bounds() {
        let mut config = ScriptingConfig::default();
        config.substitution_depth = 0;
        assert!(config.validate().is_err());

        config.substitution_depth = MAX_SUBSTITUTION_DEPTH + 1;
        assert!(config.validate().is_err());

        config.substitution_depth = MAX_SUBSTITUTION_DEPTH;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_timeout_duration() {
        let config = ScriptingConfig {
            script_timeout: 250,
            ..Default::default()
        };
        assert_eq!(
            config.timeout_duration(),
            std::time::Duration::from_millis(250)
        );
    }

    #[test]
    fn test_deserialization_with_defaults() {
        let json = r#"{
            "scriptTimeout": 1500,
            "defaultExtractionScope": "global",
            "language": "groovy"
        }"#;

        let config: ScriptingConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.script_timeout, 1500);
        assert_eq!(config.default_extraction_scope, VariableScope::Global);
        assert_eq!(config.language, ScriptLanguage::Groovy);
        assert_eq!(config.history_limit, 1000);
        assert_eq!(config.max_log_entries, 1000);
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&ScriptingConfig::default()).unwrap();
        assert!(json.contains("scriptTimeout"));
        assert!(json.contains("5000"));
        assert!(json.contains("substitutionDepth"));
    }
}
