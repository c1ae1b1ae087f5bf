//! Per-file write serialization
//!
//! Writers to the same resolved path queue behind one async mutex. Entries
//! are dropped from the table once nobody holds or waits on them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = HashMap<PathBuf, Arc<AsyncMutex<()>>>;

/// Table of per-path locks
#[derive(Debug, Default, Clone)]
pub struct FileLocks {
    locks: Arc<Mutex<LockMap>>,
}

/// Held for the duration of a write-replace or delete on one path
#[derive(Debug)]
pub struct FileGuard {
    path: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<Mutex<LockMap>>,
}

impl FileLocks {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `path`
    pub async fn lock(&self, path: &Path) -> FileGuard {
        let entry = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(path.to_path_buf()).or_default())
        };

        let guard = entry.lock_owned().await;
        FileGuard {
            path: path.to_path_buf(),
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Number of paths with a live lock entry
    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    /// Whether no path is currently locked or awaited
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for FileGuard {
    fn drop(&mut self) {
        // Release first so the strong count reflects only waiters
        drop(self.guard.take());

        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = locks.get(&self.path) {
            if Arc::strong_count(entry) == 1 {
                locks.remove(&self.path);
            }
        }
    }
}
