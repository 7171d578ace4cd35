//! Variable error types.

use super::VariableScope;

/// Errors that can occur while reading, writing or resolving variables.
#[derive(Debug, Clone, PartialEq)]
pub enum VarError {
    /// Scope name is not one of global/environment/collection/request.
    UnknownScope(String),
    /// Variable key is empty or malformed.
    InvalidKey(String),
    /// The invocation is not allowed to write to this scope.
    ReadOnlyScope(VariableScope),
    /// Variable is not defined in the requested scope.
    UndefinedVariable(String),
    /// Variable syntax is invalid (system variables).
    InvalidSyntax(String),
    /// Offset parsing failed (system variables).
    InvalidOffset(String),
}

impl std::fmt::Display for VarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VarError::UnknownScope(name) => write!(
                f,
                "Unknown scope '{}' (expected global, environment, collection or request)",
                name
            ),
            VarError::InvalidKey(msg) => write!(f, "Invalid variable key: {}", msg),
            VarError::ReadOnlyScope(scope) => {
                write!(f, "Scope '{}' is read-only in this context", scope)
            }
            VarError::UndefinedVariable(name) => write!(f, "Undefined variable: {}", name),
            VarError::InvalidSyntax(msg) => write!(f, "Invalid syntax: {}", msg),
            VarError::InvalidOffset(msg) => write!(f, "Invalid offset: {}", msg),
        }
    }
}

impl std::error::Error for VarError {}
