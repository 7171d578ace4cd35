//! `{{variable}}` substitution for outgoing request text.
//!
//! Replaces every `{{name}}` token with its resolved value, resolving nested
//! references inner-first up to a bounded depth. Substitution never fails:
//! tokens that cannot be resolved (undefined names, cycles, depth overflow,
//! bad system variable arguments) stay literal and are reported as warnings.

use super::system::resolve_system_expression;
use crate::models::{Header, RequestSnapshot};
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Cached `{{...}}` token pattern; inner whitespace is trimmed later.
static VARIABLE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("Failed to compile variable regex"));

const ESCAPED_OPEN: &str = "\u{E000}";
const ESCAPED_CLOSE: &str = "\u{E001}";

/// Anything that can resolve a plain (non-`$`) variable name.
pub trait VariableSource {
    /// Returns the value for `name`, or `None` if it is not defined.
    fn resolve(&self, name: &str) -> Option<String>;
}

impl VariableSource for HashMap<String, String> {
    fn resolve(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl<S: VariableSource + ?Sized> VariableSource for &S {
    fn resolve(&self, name: &str) -> Option<String> {
        (**self).resolve(name)
    }
}

/// Outcome of a substitution pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Substitution {
    /// Text with every resolvable token replaced.
    pub text: String,
    /// One message per token left literal.
    pub warnings: Vec<String>,
}

impl Substitution {
    /// Checks if every token was resolved.
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// A request with substitution applied to URL, header values and body.
#[derive(Debug, Clone, PartialEq)]
pub struct SubstitutedRequest {
    pub request: RequestSnapshot,
    pub warnings: Vec<String>,
}

/// Substitutes every `{{name}}` token in `text`.
///
/// # Arguments
///
/// * `text` - Input text, e.g. a URL or request body
/// * `source` - Resolver for plain variable names
/// * `max_depth` - How many levels of nested references are re-resolved
///
/// # Examples
///
/// ```
/// use rest_client_scripting::variables::substitute_variables;
/// use std::collections::HashMap;
///
/// let mut vars = HashMap::new();
/// vars.insert("baseUrl".to_string(), "https://api.example.com".to_string());
///
/// let result = substitute_variables("GET {{baseUrl}}/users", &vars, 5);
/// assert_eq!(result.text, "GET https://api.example.com/users");
/// assert!(result.is_complete());
/// ```
pub fn substitute_variables<S: VariableSource + ?Sized>(
    text: &str,
    source: &S,
    max_depth: usize,
) -> Substitution {
    if !text.contains("{{") {
        return Substitution {
            text: text.to_string(),
            warnings: Vec::new(),
        };
    }

    let mut warnings = Vec::new();
    let text = expand(text, source, max_depth, 0, &mut HashSet::new(), &mut warnings);
    for warning in &warnings {
        warn!("{}", warning);
    }

    Substitution { text, warnings }
}

fn expand<S: VariableSource + ?Sized>(
    text: &str,
    source: &S,
    max_depth: usize,
    depth: usize,
    visiting: &mut HashSet<String>,
    warnings: &mut Vec<String>,
) -> String {
    let text = text
        .replace("\\{{", ESCAPED_OPEN)
        .replace("\\}}", ESCAPED_CLOSE);

    let mut result = String::with_capacity(text.len() + text.len() / 4);
    let mut last_end = 0;

    for cap in VARIABLE_REGEX.captures_iter(&text) {
        let (Some(token), Some(inner)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let name = inner.as_str().trim();
        result.push_str(&text[last_end..token.start()]);
        last_end = token.end();

        if name.is_empty() {
            result.push_str(token.as_str());
            continue;
        }

        if name.starts_with('$') {
            match resolve_system_expression(name) {
                Ok(value) => result.push_str(&value),
                Err(err) => {
                    warnings.push(format!("{{{{{}}}}} left unresolved: {}", name, err));
                    result.push_str(token.as_str());
                }
            }
            continue;
        }

        if visiting.contains(name) {
            warnings.push(format!(
                "Circular reference for '{}', token left unresolved",
                name
            ));
            result.push_str(token.as_str());
            continue;
        }

        let Some(value) = source.resolve(name) else {
            warnings.push(format!("Undefined variable: {}", name));
            result.push_str(token.as_str());
            continue;
        };

        if !value.contains("{{") {
            result.push_str(&value);
            continue;
        }

        if depth >= max_depth {
            warnings.push(format!(
                "Substitution depth {} exceeded at '{}', nested tokens left unresolved",
                max_depth, name
            ));
            result.push_str(&value);
            continue;
        }

        visiting.insert(name.to_string());
        let nested = expand(&value, source, max_depth, depth + 1, visiting, warnings);
        visiting.remove(name);
        result.push_str(&nested);
    }

    result.push_str(&text[last_end..]);
    result.replace(ESCAPED_OPEN, "{{").replace(ESCAPED_CLOSE, "}}")
}

/// Applies substitution to the URL, every header value and the body.
pub fn substitute_request<S: VariableSource + ?Sized>(
    request: &RequestSnapshot,
    source: &S,
    max_depth: usize,
) -> SubstitutedRequest {
    let mut warnings = Vec::new();
    let mut apply = |text: &str| {
        let substituted = substitute_variables(text, source, max_depth);
        warnings.extend(substituted.warnings);
        substituted.text
    };

    let url = apply(&request.url);
    let headers: Vec<Header> = request
        .headers
        .iter()
        .map(|h| Header::new(h.name.clone(), apply(&h.value)))
        .collect();
    let body = request.body.as_deref().map(&mut apply);

    SubstitutedRequest {
        request: RequestSnapshot {
            method: request.method,
            url,
            headers,
            body,
        },
        warnings,
    }
}
