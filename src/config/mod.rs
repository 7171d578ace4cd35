//! Configuration management for the scripting runtime.
//!
//! Configuration is loaded from a settings JSON value under the
//! "rest-client-scripting" key, merged with defaults and exposed through a
//! process-wide singleton.

pub mod schema;

pub use schema::{ScriptingConfig, MAX_SUBSTITUTION_DEPTH};

use log::warn;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::sync::RwLock;

/// Settings key holding the scripting configuration.
pub const SETTINGS_KEY: &str = "rest-client-scripting";

/// Global configuration instance.
///
/// Lazily initialized on first access and replaced when settings change.
static CONFIG: Lazy<RwLock<ScriptingConfig>> =
    Lazy::new(|| RwLock::new(ScriptingConfig::default()));

/// Loads configuration from a settings JSON value.
///
/// Reads the "rest-client-scripting" settings, merges them with defaults,
/// validates the result, and updates the global configuration.
///
/// # Arguments
///
/// * `settings_json` - Optional JSON value containing user settings
///
/// # Returns
///
/// `Ok(ScriptingConfig)` with the loaded configuration, or `Err` if validation fails.
/// On a validation failure the global configuration is left untouched.
///
/// # Example
///
/// ```no_run
/// use rest_client_scripting::config::load_config;
/// use serde_json::json;
///
/// let settings = json!({
///     "rest-client-scripting": {
///         "scriptTimeout": 2000
///     }
/// });
///
/// let config = load_config(Some(settings)).unwrap();
/// assert_eq!(config.script_timeout, 2000);
/// ```
pub fn load_config(settings_json: Option<Value>) -> Result<ScriptingConfig, String> {
    let mut config = ScriptingConfig::default();

    if let Some(settings) = settings_json {
        if let Some(user_settings) = settings.get(SETTINGS_KEY) {
            match serde_json::from_value::<ScriptingConfig>(user_settings.clone()) {
                Ok(user_config) => {
                    config = config.merge(&user_config);
                }
                Err(e) => {
                    warn!(
                        "Failed to parse {} settings: {}. Using defaults.",
                        SETTINGS_KEY, e
                    );
                }
            }
        }
    }

    config
        .validate()
        .map_err(|e| format!("Invalid configuration: {}. Using defaults.", e))?;

    if let Ok(mut global_config) = CONFIG.write() {
        *global_config = config.clone();
    }

    Ok(config)
}

/// Gets the current global configuration.
///
/// Returns a clone of the current configuration, or the defaults if the lock
/// is poisoned.
pub fn get_config() -> ScriptingConfig {
    CONFIG
        .read()
        .map(|c| c.clone())
        .unwrap_or_else(|_| ScriptingConfig::default())
}

/// Updates the configuration in place.
///
/// If the updated configuration fails validation it is reverted to defaults.
///
/// # Example
///
/// ```no_run
/// use rest_client_scripting::config::update_config;
///
/// update_config(|config| {
///     config.script_timeout = 1000;
/// });
/// ```
pub fn update_config<F>(updater: F)
where
    F: FnOnce(&mut ScriptingConfig),
{
    if let Ok(mut config) = CONFIG.write() {
        updater(&mut config);

        if let Err(e) = config.validate() {
            warn!("Configuration validation failed after update: {}", e);
            *config = ScriptingConfig::default();
        }
    }
}

/// Resets the configuration to defaults.
pub fn reset_config() {
    if let Ok(mut config) = CONFIG.write() {
        *config = ScriptingConfig::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::VariableScope;
    use serde_json::json;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_load_config_with_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config.script_timeout, 5000);
        assert_eq!(config.history_limit, 1000);
        reset_config();
    }

    #[test]
    #[serial]
    fn test_load_config_with_user_settings() {
        let settings = json!({
            "rest-client-scripting": {
                "scriptTimeout": 750,
                "historyLimit": 10,
                "defaultExtractionScope": "collection"
            }
        });

        let config = load_config(Some(settings)).unwrap();
        assert_eq!(config.script_timeout, 750);
        assert_eq!(config.history_limit, 10);
        assert_eq!(config.default_extraction_scope, VariableScope::Collection);
        assert_eq!(config.substitution_depth, 5);
        reset_config();
    }

    #[test]
    #[serial]
    fn test_load_config_invalid_json() {
        let settings = json!({
            "rest-client-scripting": {
                "scriptTimeout": "soon"
            }
        });

        let config = load_config(Some(settings)).unwrap();
        assert_eq!(config.script_timeout, 5000);
        reset_config();
    }

    #[test]
    #[serial]
    fn test_load_config_validation_error_keeps_global() {
        reset_config();
        let settings = json!({
            "rest-client-scripting": {
                "scriptTimeout": 0
            }
        });

        let result = load_config(Some(settings));
        assert!(result
            .unwrap_err()
            .contains("scriptTimeout must be greater than 0"));
        assert_eq!(get_config().script_timeout, 5000);
    }

    #[test]
    #[serial]
    fn test_get_config_after_load() {
        reset_config();
        load_config(Some(json!({
            "rest-client-scripting": { "scriptTimeout": 9000 }
        })))
        .unwrap();

        assert_eq!(get_config().script_timeout, 9000);
        reset_config();
    }

    #[test]
    #[serial]
    fn test_update_config() {
        reset_config();
        update_config(|config| {
            config.max_log_entries = 3;
        });
        assert_eq!(get_config().max_log_entries, 3);
        reset_config();
    }

    #[test]
    #[serial]
    fn test_update_config_with_invalid_value() {
        reset_config();
        update_config(|config| {
            config.script_timeout = 42;
            config.history_limit = 0;
        });

        let config = get_config();
        assert_eq!(config.script_timeout, 5000);
        assert_eq!(config.history_limit, 1000);
        reset_config();
    }

    #[test]
    #[serial]
    fn test_no_settings_key() {
        let config = load_config(Some(json!({ "other": { "x": true } }))).unwrap();
        assert_eq!(config.script_timeout, 5000);
        reset_config();
    }
}
