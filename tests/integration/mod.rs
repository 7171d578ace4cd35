//! Integration tests module for the scripting runtime
//!
//! This module provides common fixtures shared by the end-to-end,
//! concurrency and rule tests.

pub mod concurrency_test;
pub mod end_to_end_test;
pub mod rules_test;

use rest_client_scripting::config::ScriptingConfig;
use rest_client_scripting::models::{HttpMethod, RequestSnapshot, ResponseSnapshot};
use rest_client_scripting::ScriptRuntime;
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize test environment (run once)
pub fn init_test_env() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Runtime with default settings, independent of the global configuration.
pub fn test_runtime() -> ScriptRuntime {
    init_test_env();
    ScriptRuntime::with_config(&ScriptingConfig::default())
}

/// Login request used across scenarios.
pub fn login_request() -> RequestSnapshot {
    RequestSnapshot::new(HttpMethod::POST, "https://api.example.com/auth/login")
        .with_header("Content-Type", "application/json")
        .with_body(r#"{"username": "test", "password": "pass"}"#)
}

/// JSON response with the given body.
pub fn json_response(status: u16, body: &str) -> ResponseSnapshot {
    ResponseSnapshot::new(status, if status < 400 { "OK" } else { "Error" })
        .with_header("Content-Type", "application/json")
        .with_body(body)
        .with_response_time(120)
}
