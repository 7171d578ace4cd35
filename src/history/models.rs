//! Data models for the variable history audit log.

use crate::variables::VariableScope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a variable mutation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSource {
    /// Edited directly through the variable CRUD surface.
    Manual,
    /// Written by a pre-request or test script.
    Script,
    /// Written by an ad-hoc extraction call.
    Extraction,
    /// Written by an auto-extraction rule.
    Rule,
    /// Written while importing variables.
    Import,
}

impl ChangeSource {
    /// Returns the lowercase name of the source.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeSource::Manual => "manual",
            ChangeSource::Script => "script",
            ChangeSource::Extraction => "extraction",
            ChangeSource::Rule => "rule",
            ChangeSource::Import => "import",
        }
    }
}

impl fmt::Display for ChangeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single recorded variable mutation.
///
/// Values of secret variables are masked before they reach an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableHistoryEntry {
    /// Tracker-wide monotonically increasing number; higher is more recent.
    pub sequence: u64,

    /// Name of the mutated variable.
    pub variable_name: String,

    /// Value before the mutation, `None` when the variable was created.
    pub old_value: Option<String>,

    /// Value after the mutation, `None` when the variable was deleted.
    pub new_value: Option<String>,

    /// Scope the mutation happened in.
    pub scope: VariableScope,

    /// Origin of the mutation.
    pub source: ChangeSource,

    /// When the mutation was recorded (UTC).
    pub timestamp: DateTime<Utc>,
}

/// Errors that can occur during history operations.
#[derive(Debug)]
pub enum HistoryError {
    /// Error occurred during serialization.
    SerializationError(serde_json::Error),
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryError::SerializationError(err) => {
                write!(f, "History serialization error: {}", err)
            }
        }
    }
}

impl std::error::Error for HistoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HistoryError::SerializationError(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for HistoryError {
    fn from(err: serde_json::Error) -> Self {
        HistoryError::SerializationError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_source_display() {
        assert_eq!(ChangeSource::Rule.to_string(), "rule");
        assert_eq!(ChangeSource::Script.as_str(), "script");
    }

    #[test]
    fn test_entry_serialization() {
        let entry = VariableHistoryEntry {
            sequence: 7,
            variable_name: "token".to_string(),
            old_value: None,
            new_value: Some("abc".to_string()),
            scope: VariableScope::Environment,
            source: ChangeSource::Extraction,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"variableName\":\"token\""));
        assert!(json.contains("\"source\":\"extraction\""));

        let parsed: VariableHistoryEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
    }
}
