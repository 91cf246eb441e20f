//! Per-path serialization: at most one pipeline runs for a given path at a time.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<PathBuf, Arc<Mutex<()>>>;

/// Process-wide path -> mutex map. Cheap to clone.
#[derive(Clone, Default)]
pub struct PathLocks {
    locks: Arc<LockMap>,
}

/// Held while a path is being processed. Dropping it releases the path.
pub struct PathLockGuard {
    path: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other pipeline holds `path`, then take it
    pub async fn acquire(&self, path: &Path) -> PathLockGuard {
        let mutex = {
            let entry = self.locks.entry(path.to_path_buf()).or_default();
            Arc::clone(entry.value())
        };
        let guard = mutex.lock_owned().await;

        PathLockGuard {
            path: path.to_path_buf(),
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Number of paths with a holder or waiter
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for PathLockGuard {
    fn drop(&mut self) {
        // Release first so the map's Arc is the only one left if nobody is waiting
        drop(self.guard.take());
        self.locks
            .remove_if(&self.path, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
