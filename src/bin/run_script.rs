//! Script runner binary
//!
//! Runs a pre-request or test script outside the editor, against request and
//! response snapshots stored as JSON, and prints the execution result as JSON
//! on stdout. Logging goes to stderr and is controlled by `RUST_LOG`.
//!
//! # Usage
//!
//! ```text
//! run-script <script> [--request request.json] [--response response.json]
//!            [--variables variables.json] [--language javascript|groovy]
//! ```
//!
//! Without `--response` the script runs as a pre-request script. The
//! variables file is an object keyed by scope name
//! (`{"environment": {"baseUrl": "..."}}`); the final state of every scope is
//! printed after the result.
//!
//! The exit code is 0 when the script succeeded and every test passed, 1
//! otherwise and 2 on usage or input errors.

use rest_client_scripting::config::get_config;
use rest_client_scripting::models::{HttpMethod, RequestSnapshot, ResponseSnapshot};
use rest_client_scripting::variables::VariableScope;
use rest_client_scripting::{ScriptLanguage, ScriptRuntime};
use serde_json::{json, Value};
use std::fs;
use std::process::ExitCode;

struct Args {
    script: String,
    request: Option<String>,
    response: Option<String>,
    variables: Option<String>,
    language: Option<ScriptLanguage>,
}

fn usage() -> String {
    "usage: run-script <script> [--request FILE] [--response FILE] [--variables FILE] [--language javascript|groovy]".to_string()
}

fn parse_args() -> Result<Args, String> {
    let mut args = std::env::args().skip(1);
    let mut script = None;
    let mut parsed = Args {
        script: String::new(),
        request: None,
        response: None,
        variables: None,
        language: None,
    };

    while let Some(arg) = args.next() {
        let mut value = |flag: &str| args.next().ok_or_else(|| format!("{} needs a value", flag));
        match arg.as_str() {
            "--request" => parsed.request = Some(value("--request")?),
            "--response" => parsed.response = Some(value("--response")?),
            "--variables" => parsed.variables = Some(value("--variables")?),
            "--language" => parsed.language = Some(value("--language")?.parse()?),
            "-h" | "--help" => return Err(usage()),
            other if other.starts_with("--") => return Err(format!("unknown flag {}", other)),
            other => script = Some(other.to_string()),
        }
    }

    parsed.script = script.ok_or_else(usage)?;
    Ok(parsed)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path, e))?;
    serde_json::from_str(&text).map_err(|e| format!("Invalid JSON in {}: {}", path, e))
}

fn load_variables(runtime: &ScriptRuntime, path: &str) -> Result<(), String> {
    let scopes: Value = read_json(path)?;
    let scopes = scopes
        .as_object()
        .ok_or_else(|| format!("{} must contain an object keyed by scope", path))?;

    for (scope_name, values) in scopes {
        let scope: VariableScope = scope_name.parse().map_err(|e| format!("{}", e))?;
        let Some(values) = values.as_object() else {
            continue;
        };
        for (key, value) in values {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            runtime
                .variables()
                .set(key, text, scope)
                .map_err(|e| format!("{}", e))?;
        }
    }
    Ok(())
}

fn run() -> Result<bool, String> {
    let args = parse_args()?;
    let script = fs::read_to_string(&args.script)
        .map_err(|e| format!("Failed to read {}: {}", args.script, e))?;

    let mut runtime = ScriptRuntime::with_config(&get_config());
    if let Some(language) = args.language {
        runtime = runtime.with_language(language);
    }
    if let Some(path) = &args.variables {
        load_variables(&runtime, path)?;
    }

    let request = match &args.request {
        Some(path) => read_json::<RequestSnapshot>(path)?,
        None => RequestSnapshot::new(HttpMethod::GET, "http://localhost/"),
    };

    let result = match &args.response {
        Some(path) => {
            let response: ResponseSnapshot = read_json(path)?;
            runtime.run_test_script(&script, &request, &response)
        }
        None => runtime.run_pre_request_script(&script, &request),
    };

    let output = json!({
        "result": result,
        "variables": runtime.variables().export_all(),
    });
    let text = serde_json::to_string_pretty(&output).map_err(|e| e.to_string())?;
    println!("{}", text);

    Ok(result.success && result.all_tests_passed())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(message) => {
            eprintln!("{}", message);
            ExitCode::from(2)
        }
    }
}
