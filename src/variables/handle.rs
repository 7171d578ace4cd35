//! Bounded view over the variable store handed to a single invocation.

use super::{VarError, VariableScope, VariableStore};
use crate::history::ChangeSource;
use std::sync::Arc;

/// Get/set access to a [`VariableStore`] restricted to a set of writable
/// scopes. Every write is recorded in history under the handle's source.
#[derive(Debug, Clone)]
pub struct VariableHandle {
    store: Arc<VariableStore>,
    writable: [bool; 4],
    source: ChangeSource,
}

impl VariableHandle {
    /// Handle that may write every scope.
    pub fn new(store: Arc<VariableStore>, source: ChangeSource) -> Self {
        Self {
            store,
            writable: [true; 4],
            source,
        }
    }

    /// Handle that may only write the listed scopes.
    pub fn with_writable_scopes(
        store: Arc<VariableStore>,
        scopes: &[VariableScope],
        source: ChangeSource,
    ) -> Self {
        let mut writable = [false; 4];
        for scope in scopes {
            writable[scope.index()] = true;
        }
        Self {
            store,
            writable,
            source,
        }
    }

    /// Handle that cannot write at all.
    pub fn read_only(store: Arc<VariableStore>) -> Self {
        Self::with_writable_scopes(store, &[], ChangeSource::Manual)
    }

    pub(crate) fn store(&self) -> &Arc<VariableStore> {
        &self.store
    }

    pub fn source(&self) -> ChangeSource {
        self.source
    }

    pub fn can_write(&self, scope: VariableScope) -> bool {
        self.writable[scope.index()]
    }

    /// Reads `key` from `scope`, or by precedence when `scope` is `None`.
    pub fn get(&self, key: &str, scope: Option<VariableScope>) -> Option<String> {
        self.store.get(key, scope)
    }

    pub fn has(&self, key: &str, scope: Option<VariableScope>) -> bool {
        self.store.get_variable(key, scope).is_some()
    }

    /// Writes `key` into `scope` if the handle is allowed to.
    pub fn set(
        &self,
        key: &str,
        value: impl Into<String>,
        scope: VariableScope,
    ) -> Result<Option<String>, VarError> {
        if !self.can_write(scope) {
            return Err(VarError::ReadOnlyScope(scope));
        }
        self.store
            .set_with_source(key, value, None, scope, self.source)
    }

    /// Removes `key` from `scope` if the handle is allowed to.
    ///
    /// # Returns
    ///
    /// `true` if a variable was removed.
    pub fn unset(&self, key: &str, scope: VariableScope) -> Result<bool, VarError> {
        if !self.can_write(scope) {
            return Err(VarError::ReadOnlyScope(scope));
        }
        Ok(self.store.delete(key, scope).is_some())
    }
}
