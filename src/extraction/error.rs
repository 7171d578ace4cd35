//! Extraction error types.

use crate::variables::VarError;
use std::fmt;

/// Errors produced by the extractors.
///
/// A query that matches nothing is not an error; extractors return
/// `Ok(None)` for that case.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionError {
    /// Input (JSON or XML body) could not be parsed.
    Parse(String),
    /// Query expression (JSONPath, XML path or regex) is malformed.
    InvalidPattern(String),
    /// Source/method combination is not supported.
    Unsupported(String),
    /// Extracted value could not be stored.
    Variable(VarError),
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionError::Parse(msg) => write!(f, "Parse error: {}", msg),
            ExtractionError::InvalidPattern(msg) => write!(f, "Invalid pattern: {}", msg),
            ExtractionError::Unsupported(msg) => write!(f, "Unsupported extraction: {}", msg),
            ExtractionError::Variable(err) => write!(f, "Could not store value: {}", err),
        }
    }
}

impl std::error::Error for ExtractionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExtractionError::Variable(err) => Some(err),
            _ => None,
        }
    }
}

impl From<VarError> for ExtractionError {
    fn from(err: VarError) -> Self {
        ExtractionError::Variable(err)
    }
}

impl From<regex::Error> for ExtractionError {
    fn from(err: regex::Error) -> Self {
        ExtractionError::InvalidPattern(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            ExtractionError::Parse("expected value at line 1".into()).to_string(),
            "Parse error: expected value at line 1"
        );
        let err: ExtractionError = VarError::InvalidKey("empty".into()).into();
        assert!(err.to_string().starts_with("Could not store value"));
    }

    #[test]
    fn test_from_regex_error() {
        let err: ExtractionError = regex::Regex::new("(").unwrap_err().into();
        assert!(matches!(err, ExtractionError::InvalidPattern(_)));
    }
}
