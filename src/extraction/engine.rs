//! Extraction engine writing results into the variable store.
//!
//! Every extractor can run in preview mode (no target, nothing is written)
//! or with an [`ExtractionTarget`], in which case a successful extraction is
//! written to the store and recorded in history with
//! [`ChangeSource::Extraction`]. A miss never writes.

use super::{
    extract_from_header, extract_from_json, extract_from_xml, extract_with_regex,
    json_value_to_string, ExtractionError,
};
use crate::history::ChangeSource;
use crate::models::Header;
use crate::variables::{VariableScope, VariableStore};
use log::debug;
use serde_json::Value;
use std::sync::Arc;

/// Where an extracted value is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionTarget {
    pub variable_name: String,
    pub scope: VariableScope,
}

impl ExtractionTarget {
    pub fn new(variable_name: impl Into<String>, scope: VariableScope) -> Self {
        Self {
            variable_name: variable_name.into(),
            scope,
        }
    }
}

/// Extractors bound to a variable store.
#[derive(Debug, Clone)]
pub struct ExtractionEngine {
    store: Arc<VariableStore>,
    source: ChangeSource,
}

impl ExtractionEngine {
    pub fn new(store: Arc<VariableStore>) -> Self {
        Self::with_source(store, ChangeSource::Extraction)
    }

    /// Engine recording its writes under another change source.
    pub fn with_source(store: Arc<VariableStore>, source: ChangeSource) -> Self {
        Self { store, source }
    }

    pub fn store(&self) -> &Arc<VariableStore> {
        &self.store
    }

    /// JSONPath extraction; see [`extract_from_json`].
    pub fn extract_from_json(
        &self,
        body: &str,
        path: &str,
        target: Option<&ExtractionTarget>,
    ) -> Result<Option<Value>, ExtractionError> {
        let value = extract_from_json(body, path)?;
        if let Some(value) = &value {
            self.store_value(target, json_value_to_string(value))?;
        }
        Ok(value)
    }

    /// XML path extraction; see [`extract_from_xml`].
    pub fn extract_from_xml(
        &self,
        body: &str,
        path: &str,
        target: Option<&ExtractionTarget>,
    ) -> Result<Option<String>, ExtractionError> {
        let value = extract_from_xml(body, path)?;
        if let Some(value) = &value {
            self.store_value(target, value.clone())?;
        }
        Ok(value)
    }

    /// Case-insensitive header lookup; see [`extract_from_header`].
    pub fn extract_from_header(
        &self,
        headers: &[Header],
        name: &str,
        target: Option<&ExtractionTarget>,
    ) -> Result<Option<String>, ExtractionError> {
        let value = extract_from_header(headers, name);
        if let Some(value) = &value {
            self.store_value(target, value.clone())?;
        }
        Ok(value)
    }

    /// Regex extraction; see [`extract_with_regex`].
    pub fn extract_with_regex(
        &self,
        content: &str,
        pattern: &str,
        has_capture_group: Option<bool>,
        target: Option<&ExtractionTarget>,
    ) -> Result<Option<String>, ExtractionError> {
        let value = extract_with_regex(content, pattern, has_capture_group)?;
        if let Some(value) = &value {
            self.store_value(target, value.clone())?;
        }
        Ok(value)
    }

    fn store_value(
        &self,
        target: Option<&ExtractionTarget>,
        value: String,
    ) -> Result<(), ExtractionError> {
        let Some(target) = target else {
            return Ok(());
        };
        self.store.set_with_source(
            &target.variable_name,
            value,
            None,
            target.scope,
            self.source,
        )?;
        debug!(
            "extracted value stored in {}.{}",
            target.scope, target.variable_name
        );
        Ok(())
    }
}
