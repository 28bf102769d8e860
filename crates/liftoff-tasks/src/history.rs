//! Observed task durations.
//!
//! A run records how long every task actually took. Handing the same
//! history to the next scheduler makes the critical-path analysis use those
//! measurements instead of the declared estimates. The history lives in
//! memory; callers that want it across process restarts serialize it
//! themselves.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::task::TaskId;

/// Thread-safe map of task id to last observed duration in milliseconds
#[derive(Debug, Default)]
pub struct DurationHistory {
    entries: Mutex<HashMap<TaskId, u64>>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    durations_ms: HashMap<TaskId, u64>,
}

impl DurationHistory {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a measured duration, replacing any earlier one
    pub fn record(&self, id: &TaskId, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), millis);
    }

    /// Last observed duration in milliseconds
    pub fn get(&self, id: &TaskId) -> Option<u64> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .copied()
    }

    /// Observed duration if known, otherwise the estimate
    pub fn cost_or(&self, id: &TaskId, estimate: u64) -> u64 {
        self.get(id).unwrap_or(estimate)
    }

    /// Number of recorded tasks
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        let snapshot = Snapshot {
            durations_ms: self
                .entries
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        };
        serde_json::to_string_pretty(&snapshot)
    }

    /// Restore from JSON produced by [`DurationHistory::to_json`]
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        Ok(Self {
            entries: Mutex::new(snapshot.durations_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_get() {
        let history = DurationHistory::new();
        let id = TaskId::new("db");
        assert!(history.is_empty());
        assert_eq!(history.cost_or(&id, 5), 5);

        history.record(&id, Duration::from_millis(37));
        assert_eq!(history.get(&id), Some(37));
        assert_eq!(history.cost_or(&id, 5), 37);

        history.record(&id, Duration::from_millis(12));
        assert_eq!(history.get(&id), Some(12));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_json_restore() {
        let history = DurationHistory::new();
        history.record(&TaskId::new("net"), Duration::from_millis(80));
        history.record(&TaskId::new("ui"), Duration::from_millis(15));

        let json = history.to_json().unwrap();
        assert!(json.contains("durations_ms"));

        let restored = DurationHistory::from_json(&json).unwrap();
        assert_eq!(restored.get(&TaskId::new("net")), Some(80));
        assert_eq!(restored.get(&TaskId::new("ui")), Some(15));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(DurationHistory::from_json("not json").is_err());
    }
}
