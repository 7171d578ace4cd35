//! Sandboxed pre-request and test scripts.
//!
//! Scripts run on an embedded Rhai interpreter. Two front-end syntaxes are
//! accepted, a JavaScript-flavoured one and a Groovy-style one; both are
//! rewritten by [`dialect`] into the interpreter's own syntax and see the
//! same `pm` object, helpers and assertion chain.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rest_client_scripting::history::ChangeSource;
//! use rest_client_scripting::models::{HttpMethod, RequestSnapshot};
//! use rest_client_scripting::scripting::{SandboxExecutor, ScriptContext};
//! use rest_client_scripting::variables::{VariableHandle, VariableScope, VariableStore};
//!
//! let store = Arc::new(VariableStore::new());
//! let handle = VariableHandle::new(store.clone(), ChangeSource::Script);
//! let request = RequestSnapshot::new(HttpMethod::GET, "https://api.example.com/users");
//!
//! let result = SandboxExecutor::new().execute(
//!     "pm.environment.set('base', 'https://api.example.com');",
//!     ScriptContext::pre_request(request, handle),
//! );
//! assert!(result.success);
//! assert_eq!(store.get("base", Some(VariableScope::Environment)).as_deref(), Some("https://api.example.com"));
//! ```

mod assertions;
mod convert;
pub mod dialect;
mod error;
mod helpers;
mod pm;
mod result;
mod sandbox;

pub use error::ScriptError;
pub use result::{ScriptExecutionResult, TestResult};
pub use sandbox::{SandboxExecutor, ScriptContext, ScriptKind};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Front-end syntax a script is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptLanguage {
    #[default]
    JavaScript,
    Groovy,
}

impl ScriptLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptLanguage::JavaScript => "javascript",
            ScriptLanguage::Groovy => "groovy",
        }
    }
}

impl fmt::Display for ScriptLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScriptLanguage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "javascript" | "js" => Ok(ScriptLanguage::JavaScript),
            "groovy" => Ok(ScriptLanguage::Groovy),
            other => Err(format!("Unknown script language: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_parse() {
        assert_eq!("JS".parse::<ScriptLanguage>(), Ok(ScriptLanguage::JavaScript));
        assert_eq!("groovy".parse::<ScriptLanguage>(), Ok(ScriptLanguage::Groovy));
        assert!("python".parse::<ScriptLanguage>().is_err());
    }

    #[test]
    fn test_language_serde() {
        let json = serde_json::to_string(&ScriptLanguage::Groovy).unwrap();
        assert_eq!(json, "\"groovy\"");
        let parsed: ScriptLanguage = serde_json::from_str("\"javascript\"").unwrap();
        assert_eq!(parsed, ScriptLanguage::JavaScript);
    }
}
