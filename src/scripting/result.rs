//! Outcome of a single script invocation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of one `test(name, fn)` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TestResult {
    pub fn passed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            error: None,
        }
    }

    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            error: Some(error.into()),
        }
    }
}

/// Everything a caller needs to display after running a script.
///
/// `success` only reflects whether the script ran to completion; failing
/// `test()` blocks are reported in `test_results` and leave it `true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptExecutionResult {
    pub success: bool,

    /// Value of the last expression, if it was not unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// `"timeout"` or the uncaught error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Console output captured up to completion or failure.
    #[serde(default)]
    pub logs: Vec<String>,

    #[serde(default)]
    pub test_results: Vec<TestResult>,

    /// Wall-clock duration in milliseconds.
    #[serde(default)]
    pub duration_ms: u64,
}

impl ScriptExecutionResult {
    pub fn passed_count(&self) -> usize {
        self.test_results.iter().filter(|t| t.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.test_results.iter().filter(|t| !t.passed).count()
    }

    pub fn all_tests_passed(&self) -> bool {
        self.test_results.iter().all(|t| t.passed)
    }

    pub fn is_timeout(&self) -> bool {
        self.error.as_deref() == Some("timeout")
    }
}
