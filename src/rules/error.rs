//! Rule error types.

use std::fmt;

/// Errors that can occur while managing or persisting rules.
///
/// Evaluation failures are not `RuleError`s; they are collected per rule in
/// the batch report.
#[derive(Debug)]
pub enum RuleError {
    /// Rule failed validation.
    Validation(String),
    /// No rule with this id.
    NotFound(String),
    /// A rule with this id already exists.
    DuplicateId(String),
    /// Rule JSON could not be read or written.
    Serialization(serde_json::Error),
    /// Rule file could not be read or written.
    Storage(std::io::Error),
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleError::Validation(msg) => write!(f, "Invalid rule: {}", msg),
            RuleError::NotFound(id) => write!(f, "Rule not found: {}", id),
            RuleError::DuplicateId(id) => write!(f, "Rule id already exists: {}", id),
            RuleError::Serialization(err) => write!(f, "Rule serialization error: {}", err),
            RuleError::Storage(err) => write!(f, "Rule storage error: {}", err),
        }
    }
}

impl std::error::Error for RuleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RuleError::Serialization(err) => Some(err),
            RuleError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for RuleError {
    fn from(err: serde_json::Error) -> Self {
        RuleError::Serialization(err)
    }
}

impl From<std::io::Error> for RuleError {
    fn from(err: std::io::Error) -> Self {
        RuleError::Storage(err)
    }
}
