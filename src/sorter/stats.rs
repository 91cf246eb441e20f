use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by all workers
#[derive(Debug, Default)]
pub struct SortStats {
    files_sorted: AtomicU64,
    files_failed: AtomicU64,
    files_skipped: AtomicU64,
}

/// Point-in-time copy of [`SortStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub files_sorted: u64,
    pub files_failed: u64,
    pub files_skipped: u64,
}

impl SortStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sorted(&self) {
        self.files_sorted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.files_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            files_sorted: self.files_sorted.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
        }
    }
}
