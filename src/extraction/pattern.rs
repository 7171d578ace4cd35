//! Regex extraction.

use super::ExtractionError;
use regex::Regex;

/// Compiles a pattern, mapping syntax errors to `InvalidPattern`.
pub fn compile_pattern(pattern: &str) -> Result<Regex, ExtractionError> {
    Regex::new(pattern).map_err(|e| {
        ExtractionError::InvalidPattern(format!("regex '{}': {}", pattern, e))
    })
}

/// Checks if the compiled pattern defines at least one capture group.
pub fn has_capture_group(regex: &Regex) -> bool {
    regex.captures_len() > 1
}

/// Runs `regex` against `content`.
///
/// With `use_group` the first capture group is returned, falling back to the
/// whole match when the pattern defines no group. Returns `None` when nothing
/// matches or the group did not participate in the match.
pub fn extract_with_compiled(regex: &Regex, content: &str, use_group: bool) -> Option<String> {
    let captures = regex.captures(content)?;
    let matched = if use_group && has_capture_group(regex) {
        captures.get(1)?
    } else {
        captures.get(0)?
    };
    Some(matched.as_str().to_string())
}

/// Compiles `pattern` and extracts from `content`.
///
/// `has_capture_group` of `None` means "infer from the pattern".
///
/// # Examples
///
/// ```
/// use rest_client_scripting::extraction::extract_with_regex;
///
/// assert_eq!(extract_with_regex("order-12345", r"\d+", Some(false)).unwrap().as_deref(), Some("12345"));
/// assert_eq!(extract_with_regex("token: abc123", r"token: (\w+)", Some(true)).unwrap().as_deref(), Some("abc123"));
/// assert_eq!(extract_with_regex("nothing", r"\d+", None).unwrap(), None);
/// ```
pub fn extract_with_regex(
    content: &str,
    pattern: &str,
    has_capture_group: Option<bool>,
) -> Result<Option<String>, ExtractionError> {
    let regex = compile_pattern(pattern)?;
    let use_group = has_capture_group.unwrap_or_else(|| self::has_capture_group(&regex));
    Ok(extract_with_compiled(&regex, content, use_group))
}
