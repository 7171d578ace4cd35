//! Auto-extraction rules.
//!
//! A rule names a response source (body or headers), an extraction method
//! (JSONPath, XML path, header, regex), a pattern and a target variable.
//! [`RuleStore`] holds the persisted rules; [`extract_with_rules`] evaluates
//! a batch against one response, isolating per-rule failures.

pub mod capture;
pub mod engine;
pub mod error;
pub mod models;
pub mod storage;

pub use capture::{classify_path, parse_capture_directive, parse_capture_directives, CaptureDirective};
pub use engine::extract_with_rules;
pub use error::RuleError;
pub use models::{
    AppliedRule, ExtractionMethod, ExtractionRule, RuleBatchReport, RuleFailure, RuleSource,
};
pub use storage::RuleStore;
