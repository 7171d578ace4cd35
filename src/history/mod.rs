//! Variable mutation history.
//!
//! Every write that goes through the variable store (scripts, extraction,
//! rules, manual edits) appends an entry to a capped, per-variable audit log
//! that backs the history viewer.
//!
//! # Example
//!
//! ```
//! use rest_client_scripting::history::{ChangeSource, HistoryTracker};
//! use rest_client_scripting::variables::VariableScope;
//!
//! let tracker = HistoryTracker::new(100);
//! tracker.record_history("token", None, Some("abc".into()), VariableScope::Environment, ChangeSource::Script);
//!
//! let recent = tracker.get_history(Some("token"), Some(10));
//! assert_eq!(recent.len(), 1);
//! ```

pub mod models;
pub mod tracker;

pub use models::{ChangeSource, HistoryError, VariableHistoryEntry};
pub use tracker::{export_json, filter_by_scope, filter_by_source, HistoryTracker};
