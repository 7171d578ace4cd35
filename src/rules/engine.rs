//! Batch evaluation of extraction rules against a response.

use super::{
    AppliedRule, ExtractionMethod, ExtractionRule, RuleBatchReport, RuleFailure, RuleSource,
};
use crate::extraction::{
    compile_pattern, extract_from_header, extract_from_json, extract_from_xml,
    extract_with_compiled, has_capture_group, headers_as_json, headers_as_text,
    json_value_to_string, ExtractionError,
};
use crate::history::ChangeSource;
use crate::models::ResponseSnapshot;
use crate::variables::VariableStore;
use log::{debug, warn};

/// Evaluates `rules` against `response`, writing matches into `store`.
///
/// Rules run in order; disabled rules are skipped. A failing rule (bad
/// pattern, unparsable body or no match) is reported and the batch goes on.
/// A later rule writing the same variable overwrites the earlier value.
pub fn extract_with_rules(
    store: &VariableStore,
    response: &ResponseSnapshot,
    rules: &[ExtractionRule],
) -> RuleBatchReport {
    let mut report = RuleBatchReport::default();

    for rule in rules.iter().filter(|r| r.enabled) {
        let outcome = evaluate_rule(rule, response).and_then(|value| match value {
            Some(value) => {
                store.set_with_source(
                    &rule.variable_name,
                    value.clone(),
                    None,
                    rule.target_scope,
                    ChangeSource::Rule,
                )?;
                Ok(value)
            }
            None => Err(RuleEvaluationError::NoMatch),
        });

        match outcome {
            Ok(value) => {
                debug!("rule '{}' set {}", rule.name, rule.variable_name);
                report.applied.push(AppliedRule {
                    rule_id: rule.id.clone(),
                    rule_name: rule.name.clone(),
                    variable_name: rule.variable_name.clone(),
                    value: Some(value),
                    success: true,
                    error: None,
                });
            }
            Err(err) => {
                let message = err.to_string();
                warn!("rule '{}' failed: {}", rule.name, message);
                report.applied.push(AppliedRule {
                    rule_id: rule.id.clone(),
                    rule_name: rule.name.clone(),
                    variable_name: rule.variable_name.clone(),
                    value: None,
                    success: false,
                    error: Some(message.clone()),
                });
                report.errors.push(RuleFailure {
                    rule_id: rule.id.clone(),
                    rule_name: rule.name.clone(),
                    message,
                });
            }
        }
    }

    report
}

/// Why a single rule produced no value.
#[derive(Debug)]
enum RuleEvaluationError {
    NoMatch,
    Extraction(ExtractionError),
}

impl std::fmt::Display for RuleEvaluationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleEvaluationError::NoMatch => f.write_str("pattern matched nothing"),
            RuleEvaluationError::Extraction(err) => write!(f, "{}", err),
        }
    }
}

impl From<ExtractionError> for RuleEvaluationError {
    fn from(err: ExtractionError) -> Self {
        RuleEvaluationError::Extraction(err)
    }
}

impl From<crate::variables::VarError> for RuleEvaluationError {
    fn from(err: crate::variables::VarError) -> Self {
        RuleEvaluationError::Extraction(err.into())
    }
}

/// Runs one rule's extractor against the selected part of the response.
fn evaluate_rule(
    rule: &ExtractionRule,
    response: &ResponseSnapshot,
) -> Result<Option<String>, RuleEvaluationError> {
    let value = match (rule.source, rule.method) {
        (RuleSource::Body, ExtractionMethod::JsonPath) => {
            extract_from_json(&response.body, &rule.pattern)?.map(|v| json_value_to_string(&v))
        }
        (RuleSource::Headers, ExtractionMethod::JsonPath) => {
            crate::extraction::jsonpath::select(&headers_as_json(&response.headers), &rule.pattern)?
                .map(|v| json_value_to_string(&v))
        }
        (RuleSource::Body, ExtractionMethod::XPath) => {
            extract_from_xml(&response.body, &rule.pattern)?
        }
        (_, ExtractionMethod::Header) => extract_from_header(&response.headers, &rule.pattern),
        (source, ExtractionMethod::Regex) => {
            let regex = compile_pattern(&rule.pattern)?;
            let use_group = rule
                .has_capture_group
                .unwrap_or_else(|| has_capture_group(&regex));
            let content = match source {
                RuleSource::Body => response.body.clone(),
                RuleSource::Headers => headers_as_text(&response.headers),
            };
            extract_with_compiled(&regex, &content, use_group)
        }
        (RuleSource::Headers, ExtractionMethod::XPath) => {
            return Err(ExtractionError::Unsupported(
                "xpath rules cannot read headers".to_string(),
            )
            .into())
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryTracker;
    use crate::variables::VariableScope;
    use std::sync::Arc;

    fn store() -> VariableStore {
        VariableStore::with_history(Arc::new(HistoryTracker::new(50)), 5)
    }

    fn response() -> ResponseSnapshot {
        ResponseSnapshot::new(200, "OK")
            .with_header("Content-Type", "application/json")
            .with_header("X-Request-Id", "req-42")
            .with_body(r#"{"data":{"token":"abc","user":{"id":7}},"order":"order-12345"}"#)
    }

    fn rule(method: ExtractionMethod, pattern: &str, var: &str) -> ExtractionRule {
        ExtractionRule::new(var, method, pattern, var).with_scope(VariableScope::Environment)
    }

    #[test]
    fn test_each_method() {
        let store = store();
        let rules = vec![
            rule(ExtractionMethod::JsonPath, "$.data.token", "token"),
            rule(ExtractionMethod::Header, "x-request-id", "requestId"),
            rule(ExtractionMethod::Regex, r"order-(\d+)", "orderId"),
            rule(ExtractionMethod::JsonPath, "$['x-request-id']", "viaJson")
                .with_source(RuleSource::Headers),
            rule(ExtractionMethod::Regex, r"X-Request-Id: (\S+)", "viaText")
                .with_source(RuleSource::Headers),
        ];

        let report = extract_with_rules(&store, &response(), &rules);
        assert!(!report.has_errors(), "{:?}", report.errors);
        assert_eq!(report.success_count(), 5);

        let get = |k: &str| store.get(k, Some(VariableScope::Environment));
        assert_eq!(get("token").as_deref(), Some("abc"));
        assert_eq!(get("requestId").as_deref(), Some("req-42"));
        assert_eq!(get("orderId").as_deref(), Some("12345"));
        assert_eq!(get("viaJson").as_deref(), Some("req-42"));
        assert_eq!(get("viaText").as_deref(), Some("req-42"));
    }

    #[test]
    fn test_invalid_rule_is_isolated() {
        let store = store();
        let rules = vec![
            rule(ExtractionMethod::Regex, "(unclosed", "broken"),
            rule(ExtractionMethod::JsonPath, "$.data.user.id", "userId"),
        ];

        let report = extract_with_rules(&store, &response(), &rules);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].rule_name, "broken");
        assert_eq!(report.applied.len(), 2);
        assert!(!report.applied[0].success);
        assert!(report.applied[1].success);
        assert_eq!(store.get("userId", None).as_deref(), Some("7"));
        assert_eq!(store.get("broken", None), None);
    }

    #[test]
    fn test_no_match_and_parse_errors_are_reported() {
        let store = store();
        let rules = vec![
            rule(ExtractionMethod::JsonPath, "$.missing", "missing"),
            rule(ExtractionMethod::XPath, "root.id", "xml"),
            rule(ExtractionMethod::XPath, "/a", "xmlHeaders").with_source(RuleSource::Headers),
        ];
        let report = extract_with_rules(&store, &response(), &rules);
        assert_eq!(report.errors.len(), 3);
        assert!(report.errors[0].message.contains("matched nothing"));
        assert!(report.errors[1].message.starts_with("Parse error"));
        assert!(report.errors[2].message.starts_with("Unsupported"));
        assert!(store.history().is_empty());
    }

    #[test]
    fn test_disabled_rules_are_skipped() {
        let store = store();
        let rules = vec![rule(ExtractionMethod::JsonPath, "$.data.token", "token").disabled()];
        let report = extract_with_rules(&store, &response(), &rules);
        assert!(report.applied.is_empty());
        assert_eq!(store.get("token", None), None);
    }

    #[test]
    fn test_last_write_wins_and_history() {
        let store = store();
        let rules = vec![
            rule(ExtractionMethod::JsonPath, "$.data.token", "value"),
            rule(ExtractionMethod::JsonPath, "$.data.user.id", "value"),
        ];
        let report = extract_with_rules(&store, &response(), &rules);
        assert!(!report.has_errors());
        assert_eq!(store.get("value", None).as_deref(), Some("7"));

        let history = store.history().get_history(Some("value"), None);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].source, ChangeSource::Rule);
        assert_eq!(history[0].old_value.as_deref(), Some("abc"));
    }

    #[test]
    fn test_explicit_capture_flag() {
        let store = store();
        let rules = vec![rule(ExtractionMethod::Regex, r"order-(\d+)", "full").with_capture_group(false)];
        extract_with_rules(&store, &response(), &rules);
        assert_eq!(store.get("full", None).as_deref(), Some("order-12345"));
    }
}
