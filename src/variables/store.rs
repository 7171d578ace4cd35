//! Scoped, thread-safe variable storage.
//!
//! The store is an ordered list of four named maps (request, collection,
//! environment, global). Each map is a `DashMap`, so parallel script
//! invocations can read and write without ever observing a half-written
//! entry. Two writers racing on the same key is last-write-wins.

use super::model::{validate_key, Variable, VariableScope, VariableType};
use super::substitution::{substitute_variables, Substitution, VariableSource};
use super::VarError;
use crate::config::{get_config, ScriptingConfig};
use crate::history::{ChangeSource, HistoryTracker};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Scoped variable store with precedence resolution and history tracking.
#[derive(Debug)]
pub struct VariableStore {
    scopes: [DashMap<String, Variable>; 4],
    history: Arc<HistoryTracker>,
    substitution_depth: usize,
}

impl Default for VariableStore {
    fn default() -> Self {
        Self::with_config(&get_config())
    }
}

impl VariableStore {
    /// Creates an empty store configured from the global configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store with its own history tracker.
    pub fn with_config(config: &ScriptingConfig) -> Self {
        Self::with_history(
            Arc::new(HistoryTracker::new(config.history_limit)),
            config.substitution_depth,
        )
    }

    /// Creates an empty store writing its audit trail to `history`.
    pub fn with_history(history: Arc<HistoryTracker>, substitution_depth: usize) -> Self {
        Self {
            scopes: Default::default(),
            history,
            substitution_depth: substitution_depth.max(1),
        }
    }

    /// History tracker receiving every mutation.
    pub fn history(&self) -> &Arc<HistoryTracker> {
        &self.history
    }

    /// Maximum nesting depth used by [`VariableStore::substitute`].
    pub fn substitution_depth(&self) -> usize {
        self.substitution_depth
    }

    fn scope_map(&self, scope: VariableScope) -> &DashMap<String, Variable> {
        &self.scopes[scope.index()]
    }

    /// Gets a variable value.
    ///
    /// With a scope, reads that scope only. Without one, walks the precedence
    /// order and returns the first enabled value. Missing keys yield `None`.
    pub fn get(&self, key: &str, scope: Option<VariableScope>) -> Option<String> {
        self.get_variable(key, scope).map(|v| v.value)
    }

    /// Like [`VariableStore::get`] but returns the whole record.
    ///
    /// Disabled variables are never returned.
    pub fn get_variable(&self, key: &str, scope: Option<VariableScope>) -> Option<Variable> {
        match scope {
            Some(scope) => self
                .scope_map(scope)
                .get(key)
                .filter(|v| v.enabled)
                .map(|v| v.clone()),
            None => VariableScope::PRECEDENCE.iter().find_map(|scope| {
                self.scope_map(*scope)
                    .get(key)
                    .filter(|v| v.enabled)
                    .map(|v| v.clone())
            }),
        }
    }

    /// Gets a variable record regardless of its enabled flag.
    pub fn get_raw(&self, key: &str, scope: VariableScope) -> Option<Variable> {
        self.scope_map(scope).get(key).map(|v| v.clone())
    }

    /// Writes `value` to `scope`, creating the key if absent.
    ///
    /// Recorded in history as a manual change.
    ///
    /// # Returns
    ///
    /// The previous value, if any.
    pub fn set(
        &self,
        key: &str,
        value: impl Into<String>,
        scope: VariableScope,
    ) -> Result<Option<String>, VarError> {
        self.set_with_source(key, value, None, scope, ChangeSource::Manual)
    }

    /// Writes `value` to `scope` and records the change under `source`.
    ///
    /// An existing secret stays secret. Otherwise the type is taken from
    /// `var_type`, or inferred from the value when `None`. The variable is
    /// enabled after the write.
    pub fn set_with_source(
        &self,
        key: &str,
        value: impl Into<String>,
        var_type: Option<VariableType>,
        scope: VariableScope,
        source: ChangeSource,
    ) -> Result<Option<String>, VarError> {
        validate_key(key)?;
        let value = value.into();

        let (old, new) = match self.scope_map(scope).entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let variable = occupied.get_mut();
                let old = variable.clone();
                variable.value = value;
                variable.enabled = true;
                if !variable.is_secret() {
                    variable.var_type = var_type.unwrap_or_else(|| VariableType::infer(&variable.value));
                }
                (Some(old), variable.clone())
            }
            Entry::Vacant(vacant) => {
                let var_type = var_type.unwrap_or_else(|| VariableType::infer(&value));
                let variable = Variable::new(key, value, scope).with_type(var_type);
                vacant.insert(variable.clone());
                (None, variable)
            }
        };

        debug!("variable {}.{} written by {}", scope, key, source);
        self.history.record_history(
            key,
            old.as_ref().map(|v| masked_value(v, &new)),
            Some(new.display_value().to_string()),
            scope,
            source,
        );

        Ok(old.map(|v| v.value))
    }

    /// Inserts or replaces a full variable record (type, description, enabled).
    pub fn set_variable(&self, variable: Variable, source: ChangeSource) -> Result<(), VarError> {
        validate_key(&variable.key)?;
        let scope = variable.scope;
        let key = variable.key.clone();
        let new_display = variable.display_value().to_string();
        let old = self.scope_map(scope).insert(key.clone(), variable.clone());

        self.history.record_history(
            &key,
            old.as_ref().map(|v| masked_value(v, &variable)),
            Some(new_display),
            scope,
            source,
        );
        Ok(())
    }

    /// Removes a variable from `scope`.
    ///
    /// # Returns
    ///
    /// The removed record, or `None` if it did not exist.
    pub fn delete(&self, key: &str, scope: VariableScope) -> Option<Variable> {
        let removed = self.scope_map(scope).remove(key).map(|(_, v)| v);
        if let Some(variable) = &removed {
            self.history.record_history(
                key,
                Some(variable.display_value().to_string()),
                None,
                scope,
                ChangeSource::Manual,
            );
        }
        removed
    }

    /// Enables or disables a variable without touching its value.
    pub fn set_enabled(&self, key: &str, scope: VariableScope, enabled: bool) -> Result<(), VarError> {
        let mut variable = self
            .scope_map(scope)
            .get_mut(key)
            .ok_or_else(|| VarError::UndefinedVariable(format!("{}.{}", scope, key)))?;
        variable.enabled = enabled;
        Ok(())
    }

    /// Lists all variables of a scope (enabled or not), sorted by key.
    pub fn list(&self, scope: VariableScope) -> Vec<Variable> {
        let mut variables: Vec<Variable> = self
            .scope_map(scope)
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        variables.sort_by(|a, b| a.key.cmp(&b.key));
        variables
    }

    /// Removes every variable of a scope.
    pub fn clear_scope(&self, scope: VariableScope) {
        self.scope_map(scope).clear();
    }

    /// Number of variables in a scope.
    pub fn len(&self, scope: VariableScope) -> usize {
        self.scope_map(scope).len()
    }

    /// Exports a scope as a JSON array with secrets masked.
    pub fn export_scope(&self, scope: VariableScope) -> Value {
        Value::Array(
            self.list(scope)
                .iter()
                .filter_map(|v| serde_json::to_value(v.masked()).ok())
                .collect(),
        )
    }

    /// Exports every scope as `{ "global": [...], ... }` with secrets masked.
    pub fn export_all(&self) -> Value {
        let mut all = Map::new();
        for scope in VariableScope::PRECEDENCE.iter().rev() {
            all.insert(scope.as_str().to_string(), self.export_scope(*scope));
        }
        Value::Object(all)
    }

    /// Replaces every `{{key}}` in `text` with its resolved value.
    ///
    /// Nested references are resolved up to the configured depth; tokens that
    /// cannot be resolved stay literal and are reported as warnings.
    pub fn substitute(&self, text: &str) -> Substitution {
        substitute_variables(text, self, self.substitution_depth)
    }
}

impl VariableSource for VariableStore {
    fn resolve(&self, name: &str) -> Option<String> {
        self.get(name, None)
    }
}

/// Masks the old value when either the old or the new record is secret.
fn masked_value(old: &Variable, new: &Variable) -> String {
    if new.is_secret() {
        new.masked().display_value().to_string()
    } else {
        old.display_value().to_string()
    }
}
