//! Scripting, variables and response extraction for a REST client
//!
//! This crate is the core a REST client's request pipeline calls into: it
//! runs user scripts before a request is sent and after its response
//! arrives, keeps scoped variables, substitutes `{{variable}}` tokens into
//! outgoing requests and extracts values from responses automatically.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - **config**: Global settings (timeouts, sandbox limits, history size)
//! - **models**: Request and response snapshots handed in by the pipeline
//! - **variables**: Scoped variable store, bounded script handle and substitution
//! - **history**: Audit log of every variable change
//! - **extraction**: JSONPath, XML path, header and regex extractors
//! - **rules**: Persisted extraction rules and batch evaluation
//! - **scripting**: Sandboxed script execution with the `pm` API
//! - **runtime**: [`ScriptRuntime`], the facade the pipeline uses
//!
//! # Request lifecycle
//!
//! 1. The pipeline builds a [`models::RequestSnapshot`] and calls
//!    [`ScriptRuntime::run_pre_request_script`]
//! 2. [`ScriptRuntime::substitute_request`] resolves `{{name}}` tokens
//! 3. The request is sent (outside this crate)
//! 4. [`ScriptRuntime::apply_rules`] runs the enabled extraction rules
//! 5. [`ScriptRuntime::run_test_script`] runs the test script and collects
//!    test results for display
//!
//! # Variable scopes
//!
//! Variables live in four scopes. An unscoped lookup checks them in order:
//! request, collection, environment, global. Scripts write through a
//! [`variables::VariableHandle`], never the store itself.
//!
//! # Example
//!
//! ```
//! use rest_client_scripting::config::ScriptingConfig;
//! use rest_client_scripting::models::{HttpMethod, RequestSnapshot, ResponseSnapshot};
//! use rest_client_scripting::ScriptRuntime;
//!
//! let runtime = ScriptRuntime::with_config(&ScriptingConfig::default());
//! let request = RequestSnapshot::new(HttpMethod::POST, "https://api.example.com/login");
//! let response = ResponseSnapshot::new(200, "OK")
//!     .with_body(r#"{"data":{"token":"abc","user":{"id":7}}}"#);
//!
//! let result = runtime.run_test_script(
//!     r#"
//!     const json = pm.response.json()
//!     pm.environment.set("authToken", json.data.token)
//!     pm.test("has id", () => {
//!         pm.expect(json.data.user.id === 7).to.be.true
//!     })
//!     "#,
//!     &request,
//!     &response,
//! );
//!
//! assert!(result.success);
//! assert_eq!(result.passed_count(), 1);
//! assert_eq!(runtime.variables().get("authToken", None).as_deref(), Some("abc"));
//! ```

pub mod config;
pub mod extraction;
pub mod history;
pub mod models;
pub mod rules;
pub mod runtime;
pub mod scripting;
pub mod variables;

pub use runtime::ScriptRuntime;
pub use scripting::{ScriptExecutionResult, ScriptLanguage, TestResult};
