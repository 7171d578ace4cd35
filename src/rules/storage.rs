//! Rule store: ordered CRUD, JSON import/export and file persistence.
//!
//! Rules keep their insertion order, which is also their evaluation order.

use super::capture::parse_capture_directives;
use super::{ExtractionRule, RuleError};
use crate::variables::VariableScope;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// On-disk / export document.
#[derive(Debug, Serialize, Deserialize)]
struct RuleDocument {
    rules: Vec<ExtractionRule>,
}

/// Accepted import shapes: a bare array or `{ "rules": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImportDocument {
    List(Vec<ExtractionRule>),
    Wrapped(RuleDocument),
}

/// Thread-safe, ordered collection of extraction rules.
#[derive(Debug, Default)]
pub struct RuleStore {
    rules: RwLock<Vec<ExtractionRule>>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<ExtractionRule>> {
        self.rules.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<ExtractionRule>> {
        self.rules.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Validates and appends a rule.
    ///
    /// # Returns
    ///
    /// The rule id (generated if the rule had none).
    pub fn add(&self, mut rule: ExtractionRule) -> Result<String, RuleError> {
        rule.validate()?;
        rule.ensure_id();

        let mut rules = self.write();
        if rules.iter().any(|r| r.id == rule.id) {
            return Err(RuleError::DuplicateId(rule.id));
        }
        let id = rule.id.clone();
        rules.push(rule);
        Ok(id)
    }

    /// Replaces the rule with the same id, keeping its position.
    pub fn update(&self, rule: ExtractionRule) -> Result<(), RuleError> {
        rule.validate()?;
        let mut rules = self.write();
        let slot = rules
            .iter_mut()
            .find(|r| r.id == rule.id)
            .ok_or_else(|| RuleError::NotFound(rule.id.clone()))?;
        *slot = rule;
        Ok(())
    }

    /// Removes a rule and returns it.
    pub fn delete(&self, id: &str) -> Result<ExtractionRule, RuleError> {
        let mut rules = self.write();
        let index = rules
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| RuleError::NotFound(id.to_string()))?;
        Ok(rules.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<ExtractionRule> {
        self.read().iter().find(|r| r.id == id).cloned()
    }

    /// All rules in evaluation order.
    pub fn list(&self) -> Vec<ExtractionRule> {
        self.read().clone()
    }

    /// Enabled rules in evaluation order.
    pub fn enabled_rules(&self) -> Vec<ExtractionRule> {
        self.read().iter().filter(|r| r.enabled).cloned().collect()
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), RuleError> {
        let mut rules = self.write();
        let rule = rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| RuleError::NotFound(id.to_string()))?;
        rule.enabled = enabled;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    /// Exports every rule as pretty JSON (`{ "rules": [...] }`).
    pub fn export_json(&self) -> Result<String, RuleError> {
        let document = RuleDocument { rules: self.list() };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    /// Imports rules from JSON.
    ///
    /// The import is all-or-nothing: if any rule fails validation nothing is
    /// changed. Imported rules replace existing rules with the same id and
    /// are appended otherwise.
    ///
    /// # Returns
    ///
    /// Number of imported rules.
    pub fn import_json(&self, json: &str) -> Result<usize, RuleError> {
        let imported = match serde_json::from_str::<ImportDocument>(json)? {
            ImportDocument::List(rules) => rules,
            ImportDocument::Wrapped(document) => document.rules,
        };
        self.merge(imported)
    }

    /// Imports every `@capture` directive in `text` as a rule writing to `scope`.
    pub fn import_capture_directives(
        &self,
        text: &str,
        scope: VariableScope,
    ) -> Result<usize, RuleError> {
        let rules = parse_capture_directives(text)
            .into_iter()
            .map(|directive| directive.into_rule(scope))
            .collect();
        self.merge(rules)
    }

    fn merge(&self, mut incoming: Vec<ExtractionRule>) -> Result<usize, RuleError> {
        for rule in incoming.iter_mut() {
            rule.validate()?;
            rule.ensure_id();
        }
        for (i, rule) in incoming.iter().enumerate() {
            if incoming[..i].iter().any(|other| other.id == rule.id) {
                return Err(RuleError::DuplicateId(rule.id.clone()));
            }
        }

        let count = incoming.len();
        let mut rules = self.write();
        for rule in incoming {
            match rules.iter_mut().find(|r| r.id == rule.id) {
                Some(existing) => *existing = rule,
                None => rules.push(rule),
            }
        }
        Ok(count)
    }

    /// Writes every rule to `path` as JSON.
    pub fn save(&self, path: &Path) -> Result<(), RuleError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.export_json()?)?;
        info!("saved {} extraction rules to {}", self.len(), path.display());
        Ok(())
    }

    /// Replaces the store content with the rules in `path`.
    ///
    /// A missing file loads as an empty store.
    pub fn load(&self, path: &Path) -> Result<usize, RuleError> {
        if !path.exists() {
            self.clear();
            return Ok(0);
        }
        let content = fs::read_to_string(path)?;
        let staged = RuleStore::new();
        let count = staged.import_json(&content)?;
        *self.write() = staged.list();
        info!("loaded {} extraction rules from {}", count, path.display());
        Ok(count)
    }

    /// Creates a store from a rule file.
    pub fn from_file(path: &Path) -> Result<Self, RuleError> {
        let store = Self::new();
        store.load(path)?;
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::ExtractionMethod;
    use tempfile::TempDir;

    fn rule(name: &str, var: &str) -> ExtractionRule {
        ExtractionRule::new(name, ExtractionMethod::JsonPath, "$.a", var)
    }

    #[test]
    fn test_add_get_list_in_order() {
        let store = RuleStore::new();
        let a = store.add(rule("a", "a")).unwrap();
        let b = store.add(rule("b", "b")).unwrap();

        assert_eq!(store.get(&a).unwrap().name, "a");
        let names: Vec<_> = store.list().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_add_generates_missing_id_and_rejects_duplicates() {
        let store = RuleStore::new();
        let id = store.add(rule("a", "a").with_id("")).unwrap();
        assert!(!id.is_empty());

        store.add(rule("b", "b").with_id("fixed")).unwrap();
        assert!(matches!(
            store.add(rule("c", "c").with_id("fixed")),
            Err(RuleError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_add_rejects_invalid_rule() {
        let store = RuleStore::new();
        assert!(matches!(
            store.add(rule("a", "not valid")),
            Err(RuleError::Validation(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_delete_set_enabled() {
        let store = RuleStore::new();
        let id = store.add(rule("a", "a")).unwrap();

        let mut updated = store.get(&id).unwrap();
        updated.pattern = "$.b".to_string();
        store.update(updated).unwrap();
        assert_eq!(store.get(&id).unwrap().pattern, "$.b");

        store.set_enabled(&id, false).unwrap();
        assert!(store.enabled_rules().is_empty());

        store.delete(&id).unwrap();
        assert!(matches!(store.delete(&id), Err(RuleError::NotFound(_))));
        assert!(matches!(
            store.update(rule("x", "x").with_id("nope")),
            Err(RuleError::NotFound(_))
        ));
    }

    #[test]
    fn test_export_import_roundtrip() {
        let source = RuleStore::new();
        source.add(rule("a", "a").with_id("1")).unwrap();
        source.add(rule("b", "b").with_id("2").disabled()).unwrap();
        let json = source.export_json().unwrap();

        let target = RuleStore::new();
        assert_eq!(target.import_json(&json).unwrap(), 2);
        assert_eq!(target.list(), source.list());
    }

    #[test]
    fn test_import_bare_array_replaces_same_id() {
        let store = RuleStore::new();
        store.add(rule("old", "a").with_id("1")).unwrap();

        let json = r#"[
            {"id": "1", "name": "new", "method": "jsonpath", "pattern": "$.x", "variableName": "x"},
            {"name": "extra", "method": "regex", "pattern": "\\d+", "variableName": "n"}
        ]"#;
        assert_eq!(store.import_json(json).unwrap(), 2);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("1").unwrap().name, "new");
    }

    #[test]
    fn test_import_is_all_or_nothing() {
        let store = RuleStore::new();
        let json = r#"[
            {"name": "ok", "method": "jsonpath", "pattern": "$.x", "variableName": "x"},
            {"name": "bad", "method": "jsonpath", "pattern": "$.x", "variableName": "1x"}
        ]"#;
        assert!(store.import_json(json).is_err());
        assert!(store.is_empty());
        assert!(matches!(
            store.import_json("{not json"),
            Err(RuleError::Serialization(_))
        ));
    }

    #[test]
    fn test_import_capture_directives() {
        let store = RuleStore::new();
        let count = store
            .import_capture_directives(
                "# @capture token = $.token\n# @capture etag = headers.ETag",
                VariableScope::Environment,
            )
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(store.list()[1].method, ExtractionMethod::Header);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("rules.json");

        let store = RuleStore::new();
        store.add(rule("a", "a")).unwrap();
        store.save(&path).unwrap();

        let loaded = RuleStore::from_file(&path).unwrap();
        assert_eq!(loaded.list(), store.list());

        let missing = RuleStore::from_file(&dir.path().join("missing.json")).unwrap();
        assert!(missing.is_empty());
    }
}
