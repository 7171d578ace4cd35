//! `@capture` directives in `.http` files, imported as extraction rules.
//!
//! # Syntax
//!
//! ```text
//! # @capture authToken = $.token
//! # @capture sessionId = headers.X-Session-Id
//! # @capture userName = /response/user/name
//! # @capture orderId = regex:order-(\d+)
//! // @capture etag = headers.ETag
//! ```
//!
//! The path kind decides the extraction method: `headers.` is a header
//! lookup, `regex:` a regex over the body, `$`/`@.` or a bracketed member a
//! JSONPath, anything else an XML path.

use super::{ExtractionMethod, ExtractionRule};
use crate::variables::VariableScope;
use once_cell::sync::Lazy;
use regex::Regex;

static CAPTURE_DIRECTIVE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:#|//)\s*@capture\s+([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.+?)\s*$")
        .expect("Failed to compile capture directive regex")
});

/// A parsed `@capture` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDirective {
    pub variable_name: String,
    pub method: ExtractionMethod,
    pub pattern: String,
}

impl CaptureDirective {
    /// Converts the directive into an enabled rule writing to `scope`.
    pub fn into_rule(self, scope: VariableScope) -> ExtractionRule {
        let name = format!("@capture {}", self.variable_name);
        ExtractionRule::new(name, self.method, self.pattern, self.variable_name).with_scope(scope)
    }
}

/// Classifies a capture path and strips its method prefix.
pub fn classify_path(path: &str) -> (ExtractionMethod, String) {
    let trimmed = path.trim();

    if let Some(header) = trimmed.strip_prefix("headers.") {
        return (ExtractionMethod::Header, header.trim().to_string());
    }
    if let Some(pattern) = trimmed.strip_prefix("regex:") {
        return (ExtractionMethod::Regex, pattern.trim().to_string());
    }
    if trimmed.starts_with('$') || trimmed.starts_with("@.") {
        return (ExtractionMethod::JsonPath, trimmed.to_string());
    }
    if trimmed.contains('[') && trimmed.contains(']') && !trimmed.starts_with('/') {
        return (ExtractionMethod::JsonPath, trimmed.to_string());
    }
    (ExtractionMethod::XPath, trimmed.to_string())
}

/// Parses one comment line; `None` if it is not a capture directive.
///
/// # Examples
///
/// ```
/// use rest_client_scripting::rules::{parse_capture_directive, ExtractionMethod};
///
/// let directive = parse_capture_directive("# @capture token = $.access_token").unwrap();
/// assert_eq!(directive.method, ExtractionMethod::JsonPath);
/// assert!(parse_capture_directive("# just a comment").is_none());
/// ```
pub fn parse_capture_directive(line: &str) -> Option<CaptureDirective> {
    let captures = CAPTURE_DIRECTIVE_REGEX.captures(line)?;
    let variable_name = captures.get(1)?.as_str().to_string();
    let (method, pattern) = classify_path(captures.get(2)?.as_str());
    if pattern.is_empty() {
        return None;
    }
    Some(CaptureDirective {
        variable_name,
        method,
        pattern,
    })
}

/// Parses every capture directive in a block of text, in order.
pub fn parse_capture_directives(text: &str) -> Vec<CaptureDirective> {
    text.lines().filter_map(parse_capture_directive).collect()
}
