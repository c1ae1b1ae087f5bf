//! Deficiency Tracking
//!
//! Records files whose backup copy is known to lag the primary because a
//! backup write or delete did not go through. While a file is flagged the
//! primary copy is authoritative and the next fetch repairs the backup.
//! The table lives in memory only; after a restart the digest comparison on
//! fetch is the only consistency check.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::storage::UserId;

/// What the backup is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeficiencyKind {
    /// The backup lacks the latest write
    StaleWrite,
    /// The backup still holds a file deleted on the primary
    PendingDelete,
}

/// A flagged file
#[derive(Debug, Clone, Serialize)]
pub struct Deficiency {
    pub user_id: UserId,
    /// Path as the client supplied it
    pub path: String,
    pub kind: DeficiencyKind,
    pub reason: String,
    pub since: DateTime<Utc>,
}

/// Files whose backup copy needs repair, keyed by resolved primary path
#[derive(Debug, Default)]
pub struct DeficiencyTracker {
    entries: RwLock<HashMap<PathBuf, Deficiency>>,
}

impl DeficiencyTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag a file, replacing any earlier record for it
    pub fn record(&self, key: &Path, user_id: UserId, path: &str, kind: DeficiencyKind, reason: impl Into<String>) {
        let deficiency = Deficiency {
            user_id,
            path: path.to_string(),
            kind,
            reason: reason.into(),
            since: Utc::now(),
        };
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.to_path_buf(), deficiency);
        }
    }

    /// Clear a flag, returning whether one was set
    pub fn clear(&self, key: &Path) -> bool {
        self.entries
            .write()
            .map(|mut entries| entries.remove(key).is_some())
            .unwrap_or(false)
    }

    /// Put back a flag previously read with [`DeficiencyTracker::get`],
    /// clearing the file if there was none
    pub fn restore(&self, key: &Path, previous: Option<Deficiency>) {
        if let Ok(mut entries) = self.entries.write() {
            match previous {
                Some(deficiency) => {
                    entries.insert(key.to_path_buf(), deficiency);
                }
                None => {
                    entries.remove(key);
                }
            }
        }
    }

    /// Current flag for a file
    pub fn get(&self, key: &Path) -> Option<Deficiency> {
        self.entries.read().ok()?.get(key).cloned()
    }

    /// Whether a file is flagged
    pub fn contains(&self, key: &Path) -> bool {
        self.get(key).is_some()
    }

    /// All flagged files, oldest first
    pub fn list(&self) -> Vec<Deficiency> {
        let mut all: Vec<Deficiency> = self
            .entries
            .read()
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default();
        all.sort_by_key(|d| d.since);
        all
    }

    /// Number of flagged files
    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_clear() {
        let tracker = DeficiencyTracker::new();
        let key = Path::new("/srv/7/a.txt");

        assert!(!tracker.contains(key));
        tracker.record(key, 7, "a.txt", DeficiencyKind::StaleWrite, "backup unreachable");
        assert!(tracker.contains(key));
        assert_eq!(tracker.len(), 1);

        // A later failure replaces the record
        tracker.record(key, 7, "a.txt", DeficiencyKind::PendingDelete, "backup rejected");
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.get(key).unwrap().kind, DeficiencyKind::PendingDelete);

        assert!(tracker.clear(key));
        assert!(!tracker.clear(key));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_restore_puts_back_previous_state() {
        let tracker = DeficiencyTracker::new();
        let key = Path::new("/srv/7/a.txt");

        tracker.record(key, 7, "a.txt", DeficiencyKind::PendingDelete, "old");
        let previous = tracker.get(key);
        tracker.record(key, 7, "a.txt", DeficiencyKind::StaleWrite, "new");
        tracker.restore(key, previous);
        assert_eq!(tracker.get(key).unwrap().reason, "old");

        tracker.restore(key, None);
        assert!(!tracker.contains(key));
    }

    #[test]
    fn test_list_is_oldest_first() {
        let tracker = DeficiencyTracker::new();
        tracker.record(Path::new("/srv/1/a"), 1, "a", DeficiencyKind::StaleWrite, "x");
        std::thread::sleep(std::time::Duration::from_millis(5));
        tracker.record(Path::new("/srv/2/b"), 2, "b", DeficiencyKind::StaleWrite, "y");

        let listed = tracker.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].user_id, 1);
        assert_eq!(listed[1].user_id, 2);
    }
}
