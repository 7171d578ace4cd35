//! Script execution error types.
//!
//! None of these escape [`SandboxExecutor::execute`](super::SandboxExecutor::execute);
//! they are folded into the error text of a
//! [`ScriptExecutionResult`](super::ScriptExecutionResult) or of a failed
//! [`TestResult`](super::TestResult).

use rhai::{Dynamic, EvalAltResult, ParseError, Position};
use std::fmt;

/// Errors raised while translating or running a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// The script ran past its wall-clock budget.
    Timeout,

    /// Uncaught exception or syntax error.
    Runtime {
        message: String,
        line: Option<usize>,
    },

    /// A failed `expect(...)` check.
    Assertion(String),

    /// A response accessor was used in a pre-request script.
    ResponseUnavailable,

    /// The script tried to write a scope its handle may not write.
    PermissionDenied(String),

    /// The source could not be rewritten into the interpreter's syntax.
    Translation { message: String, line: usize },
}

impl ScriptError {
    pub fn runtime(message: impl Into<String>) -> Self {
        ScriptError::Runtime {
            message: message.into(),
            line: None,
        }
    }

    /// Line the error points at, if known.
    pub fn line(&self) -> Option<usize> {
        match self {
            ScriptError::Runtime { line, .. } => *line,
            ScriptError::Translation { line, .. } => Some(*line),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ScriptError::Timeout)
    }

    /// Converts an interpreter error into a script error.
    ///
    /// Errors raised inside closures arrive wrapped in function-call frames;
    /// the innermost error decides the kind and the message.
    pub fn from_eval(err: &EvalAltResult) -> Self {
        let root = root_cause(err);
        match root {
            EvalAltResult::ErrorTerminated(..) => ScriptError::Timeout,
            _ => {
                let position = if root.position().is_none() {
                    err.position()
                } else {
                    root.position()
                };
                ScriptError::Runtime {
                    message: error_message(root),
                    line: position.line(),
                }
            }
        }
    }

    /// Converts a compile error into a script error.
    pub fn from_parse(err: &ParseError) -> Self {
        ScriptError::Runtime {
            message: format!("Syntax error: {}", err.0),
            line: err.1.line(),
        }
    }

    /// Wraps the error so it can be raised from a registered function.
    pub(crate) fn into_rhai(self) -> Box<EvalAltResult> {
        Box::new(EvalAltResult::ErrorRuntime(
            Dynamic::from(self.to_string()),
            Position::NONE,
        ))
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::Timeout => f.write_str("timeout"),
            ScriptError::Runtime {
                message,
                line: Some(line),
            } => write!(f, "{} (line {})", message, line),
            ScriptError::Runtime { message, line: None } => f.write_str(message),
            ScriptError::Assertion(message) => f.write_str(message),
            ScriptError::ResponseUnavailable => {
                f.write_str("response unavailable in pre-request context")
            }
            ScriptError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            ScriptError::Translation { message, line } => {
                write!(f, "Syntax error: {} (line {})", message, line)
            }
        }
    }
}

impl std::error::Error for ScriptError {}

/// Innermost error, looking through function-call and module frames.
pub(crate) fn root_cause(err: &EvalAltResult) -> &EvalAltResult {
    match err {
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => root_cause(inner),
        EvalAltResult::ErrorInModule(_, inner, _) => root_cause(inner),
        other => other,
    }
}

/// Errors that must not be swallowed by a `test()` block.
pub(crate) fn is_fatal(err: &EvalAltResult) -> bool {
    matches!(
        root_cause(err),
        EvalAltResult::ErrorTerminated(..)
            | EvalAltResult::ErrorTooManyOperations(..)
            | EvalAltResult::ErrorStackOverflow(..)
    )
}

/// Human-readable message of an error, without position information.
pub(crate) fn error_message(err: &EvalAltResult) -> String {
    let err = root_cause(err);
    if let EvalAltResult::ErrorRuntime(value, _) = err {
        return if value.is_string() {
            value.clone().into_string().unwrap_or_default()
        } else {
            value.to_string()
        };
    }

    let text = err.to_string();
    let position = err.position();
    if position.is_none() {
        return text;
    }
    let suffix = format!(" ({})", position);
    match text.strip_suffix(&suffix) {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(ScriptError::Timeout.to_string(), "timeout");
        assert_eq!(
            ScriptError::ResponseUnavailable.to_string(),
            "response unavailable in pre-request context"
        );
        let err = ScriptError::Runtime {
            message: "boom".to_string(),
            line: Some(3),
        };
        assert_eq!(err.to_string(), "boom (line 3)");
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn test_runtime_message_is_unwrapped() {
        let inner = ScriptError::Assertion("expected 1 to equal 2".to_string()).into_rhai();
        let wrapped = EvalAltResult::ErrorInFunctionCall(
            "anon".to_string(),
            String::new(),
            inner,
            Position::new(4, 2),
        );
        assert_eq!(error_message(&wrapped), "expected 1 to equal 2");
        assert_eq!(
            ScriptError::from_eval(&wrapped),
            ScriptError::Runtime {
                message: "expected 1 to equal 2".to_string(),
                line: Some(4)
            }
        );
    }

    #[test]
    fn test_terminated_maps_to_timeout() {
        let err = EvalAltResult::ErrorTerminated(Dynamic::from("timeout"), Position::NONE);
        assert!(ScriptError::from_eval(&err).is_timeout());
        assert!(is_fatal(&err));
    }
}
