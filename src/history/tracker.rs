//! In-memory, capped, append-only log of variable mutations.
//!
//! Entries are grouped per variable. Each variable keeps at most `limit`
//! entries; on overflow the oldest entry of that variable is evicted first.

use super::models::{ChangeSource, HistoryError, VariableHistoryEntry};
use crate::config::get_config;
use crate::variables::VariableScope;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct TrackerState {
    next_sequence: u64,
    entries: HashMap<String, VecDeque<VariableHistoryEntry>>,
}

/// Thread-safe variable history log.
#[derive(Debug)]
pub struct HistoryTracker {
    limit: usize,
    state: Mutex<TrackerState>,
}

impl Default for HistoryTracker {
    /// Creates a tracker using `historyLimit` from the global configuration.
    fn default() -> Self {
        Self::new(get_config().history_limit)
    }
}

impl HistoryTracker {
    /// Creates a tracker keeping at most `limit` entries per variable.
    ///
    /// A limit of 0 is treated as 1.
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Per-variable entry cap.
    pub fn limit(&self) -> usize {
        self.limit
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends an entry for `variable_name`, evicting that variable's oldest
    /// entry if the cap is exceeded.
    ///
    /// # Returns
    ///
    /// A copy of the recorded entry.
    pub fn record_history(
        &self,
        variable_name: &str,
        old_value: Option<String>,
        new_value: Option<String>,
        scope: VariableScope,
        source: ChangeSource,
    ) -> VariableHistoryEntry {
        let mut state = self.lock();
        state.next_sequence += 1;

        let entry = VariableHistoryEntry {
            sequence: state.next_sequence,
            variable_name: variable_name.to_string(),
            old_value,
            new_value,
            scope,
            source,
            timestamp: Utc::now(),
        };

        let trail = state.entries.entry(variable_name.to_string()).or_default();
        trail.push_back(entry.clone());
        while trail.len() > self.limit {
            trail.pop_front();
        }

        entry
    }

    /// Returns entries most-recent-first.
    ///
    /// # Arguments
    ///
    /// * `variable_name` - Restrict to one variable, or `None` for all
    /// * `limit` - Maximum number of entries to return, or `None` for all
    pub fn get_history(
        &self,
        variable_name: Option<&str>,
        limit: Option<usize>,
    ) -> Vec<VariableHistoryEntry> {
        let state = self.lock();

        let mut entries: Vec<VariableHistoryEntry> = match variable_name {
            Some(name) => state
                .entries
                .get(name)
                .map(|trail| trail.iter().rev().cloned().collect())
                .unwrap_or_default(),
            None => {
                let mut all: Vec<VariableHistoryEntry> =
                    state.entries.values().flatten().cloned().collect();
                all.sort_by(|a, b| b.sequence.cmp(&a.sequence));
                all
            }
        };

        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        entries
    }

    /// Clears one variable's trail, or the entire log when no name is given.
    pub fn clear_history(&self, variable_name: Option<&str>) {
        let mut state = self.lock();
        match variable_name {
            Some(name) => {
                state.entries.remove(name);
            }
            None => state.entries.clear(),
        }
    }

    /// Total number of entries across all variables.
    pub fn len(&self) -> usize {
        self.lock().entries.values().map(VecDeque::len).sum()
    }

    /// Checks if the log holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of all variables with at least one entry, sorted.
    pub fn tracked_variables(&self) -> Vec<String> {
        let state = self.lock();
        let mut names: Vec<String> = state.entries.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Keeps only entries recorded in `scope`.
pub fn filter_by_scope(
    entries: &[VariableHistoryEntry],
    scope: VariableScope,
) -> Vec<VariableHistoryEntry> {
    entries.iter().filter(|e| e.scope == scope).cloned().collect()
}

/// Keeps only entries produced by `source`.
pub fn filter_by_source(
    entries: &[VariableHistoryEntry],
    source: ChangeSource,
) -> Vec<VariableHistoryEntry> {
    entries.iter().filter(|e| e.source == source).cloned().collect()
}

/// Serializes entries as pretty JSON for the history viewer.
pub fn export_json(entries: &[VariableHistoryEntry]) -> Result<String, HistoryError> {
    Ok(serde_json::to_string_pretty(entries)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tracker: &HistoryTracker, name: &str, value: &str) {
        tracker.record_history(
            name,
            None,
            Some(value.to_string()),
            VariableScope::Environment,
            ChangeSource::Manual,
        );
    }

    #[test]
    fn test_record_and_get_most_recent_first() {
        let tracker = HistoryTracker::new(10);
        record(&tracker, "token", "a");
        record(&tracker, "token", "b");
        record(&tracker, "token", "c");

        let history = tracker.get_history(Some("token"), None);
        let values: Vec<_> = history.iter().map(|e| e.new_value.clone().unwrap()).collect();
        assert_eq!(values, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_cap_evicts_oldest_first() {
        let tracker = HistoryTracker::new(3);
        for i in 0..4 {
            record(&tracker, "counter", &i.to_string());
        }

        let history = tracker.get_history(Some("counter"), None);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].new_value.as_deref(), Some("3"));
        assert_eq!(history[2].new_value.as_deref(), Some("1"));
    }

    #[test]
    fn test_cap_is_per_variable() {
        let tracker = HistoryTracker::new(2);
        record(&tracker, "a", "1");
        record(&tracker, "a", "2");
        record(&tracker, "a", "3");
        record(&tracker, "b", "1");

        assert_eq!(tracker.get_history(Some("a"), None).len(), 2);
        assert_eq!(tracker.get_history(Some("b"), None).len(), 1);
        assert_eq!(tracker.len(), 3);
    }

    #[test]
    fn test_get_all_with_limit() {
        let tracker = HistoryTracker::new(10);
        record(&tracker, "a", "1");
        record(&tracker, "b", "1");
        record(&tracker, "a", "2");

        let all = tracker.get_history(None, None);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].variable_name, "a");
        assert_eq!(all[0].new_value.as_deref(), Some("2"));
        assert_eq!(all[1].variable_name, "b");

        let limited = tracker.get_history(None, Some(2));
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn test_clear_one_and_all() {
        let tracker = HistoryTracker::new(10);
        record(&tracker, "a", "1");
        record(&tracker, "b", "1");

        tracker.clear_history(Some("a"));
        assert!(tracker.get_history(Some("a"), None).is_empty());
        assert_eq!(tracker.tracked_variables(), vec!["b".to_string()]);

        tracker.clear_history(None);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_missing_variable_returns_empty() {
        let tracker = HistoryTracker::new(10);
        assert!(tracker.get_history(Some("nothing"), Some(5)).is_empty());
    }

    #[test]
    fn test_filters_and_export() {
        let tracker = HistoryTracker::new(10);
        tracker.record_history("a", None, Some("1".into()), VariableScope::Global, ChangeSource::Rule);
        tracker.record_history("b", None, Some("2".into()), VariableScope::Request, ChangeSource::Script);

        let all = tracker.get_history(None, None);
        assert_eq!(filter_by_scope(&all, VariableScope::Global).len(), 1);
        assert_eq!(filter_by_source(&all, ChangeSource::Script)[0].variable_name, "b");

        let json = export_json(&all).unwrap();
        assert!(json.contains("\"variableName\": \"a\""));
    }

    #[test]
    fn test_zero_limit_is_clamped() {
        let tracker = HistoryTracker::new(0);
        assert_eq!(tracker.limit(), 1);
    }
}
