//! Event Coordinator
//!
//! Filters raw file events, then runs one pipeline task per admitted file. Tasks are
//! bounded by a semaphore, and tasks for the same path run one after another.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::Instrument;
use walkdir::WalkDir;

use super::watcher::FileEvent;
use crate::config::ConfigStore;
use crate::sorter::{PathLocks, Pipeline, ProcessOutcome};

/// Marker found anywhere in a Chrome partial download name
const PARTIAL_MARKER: &str = "crdownload";

/// Suffixes used by browsers and download managers for in-progress files
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".partial", ".download", ".tmp"];

/// The application's own installer artifacts, never sorted
const DENYLIST: &[&str] = &["SmartSort.app", "SmartSort.zip", "SmartSort.exe", "Unknown"];

/// Why an event was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    NotAFile,
    Symlink,
    Hidden,
    InProgressDownload,
    Denylisted,
}

/// Admission decision for a raw event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    FilteredOut(FilterReason),
}

/// Decide whether a path should go through the pipeline
pub fn admit(path: &Path) -> Admission {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    if name.is_empty() {
        return Admission::FilteredOut(FilterReason::NotAFile);
    }
    if name.starts_with('.') {
        return Admission::FilteredOut(FilterReason::Hidden);
    }

    let lower = name.to_lowercase();
    if lower.contains(PARTIAL_MARKER) || PARTIAL_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
        return Admission::FilteredOut(FilterReason::InProgressDownload);
    }
    if DENYLIST.contains(&name.as_str()) {
        return Admission::FilteredOut(FilterReason::Denylisted);
    }

    // A path that no longer exists is admitted: the pipeline reports it as vanished
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => Admission::FilteredOut(FilterReason::Symlink),
        Ok(meta) if meta.is_dir() => Admission::FilteredOut(FilterReason::NotAFile),
        _ => Admission::Admitted,
    }
}

/// Drives the pipeline for incoming events
#[derive(Clone)]
pub struct EventCoordinator {
    config: Arc<ConfigStore>,
    pipeline: Arc<Pipeline>,
    locks: PathLocks,
    workers: Arc<Semaphore>,
}

impl EventCoordinator {
    pub fn new(config: Arc<ConfigStore>, pipeline: Arc<Pipeline>) -> Self {
        let worker_count = config.snapshot().worker_count().max(1);
        Self {
            config,
            pipeline,
            locks: PathLocks::new(),
            workers: Arc::new(Semaphore::new(worker_count)),
        }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Filter, serialize on the path, and run the pipeline. Returns None when the
    /// event was filtered out.
    pub async fn handle(&self, event: FileEvent) -> Option<ProcessOutcome> {
        if let Admission::FilteredOut(reason) = admit(&event.path) {
            tracing::trace!(path = %event.path.display(), ?reason, "Event filtered out");
            return None;
        }

        let event_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("sort", %event_id, kind = ?event.kind);

        let outcome = async {
            let _guard = self.locks.acquire(&event.path).await;
            // Snapshot taken after the lock: a reload applies to events admitted after it
            let config = self.config.snapshot();
            self.pipeline.process(&event.path, &config).await
        }
        .instrument(span)
        .await;
        Some(outcome)
    }

    /// Consume events until the channel closes, then wait for in-flight work
    pub async fn run(&self, mut rx: mpsc::Receiver<FileEvent>) {
        let mut tasks = JoinSet::new();

        while let Some(event) = rx.recv().await {
            // Waiting for a permit here pushes back on the watcher under bursts
            let Ok(permit) = Arc::clone(&self.workers).acquire_owned().await else {
                break;
            };
            let coordinator = self.clone();
            tasks.spawn(async move {
                let outcome = coordinator.handle(event).await;
                drop(permit);
                outcome
            });

            // Reap finished tasks so the set does not grow without bound
            while let Some(joined) = tasks.try_join_next() {
                self.log_join(joined);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            self.log_join(joined);
        }
        tracing::debug!(stats = ?self.pipeline.stats().snapshot(), "Coordinator stopped");
    }

    fn log_join(&self, joined: Result<Option<ProcessOutcome>, tokio::task::JoinError>) {
        if let Err(e) = joined {
            tracing::error!(error = %e, "Sort task panicked");
            self.pipeline.stats().record_failed();
        }
    }

    /// Sort the files already sitting in `dirs`, concurrently, through the same
    /// admission and per-path locking as live events.
    pub async fn startup_cleanup(&self, dirs: &[PathBuf]) -> Vec<ProcessOutcome> {
        let files: Vec<PathBuf> = dirs
            .iter()
            .flat_map(|dir| {
                WalkDir::new(dir)
                    .min_depth(1)
                    .max_depth(1)
                    .into_iter()
                    .filter_map(|entry| match entry {
                        Ok(entry) => Some(entry),
                        Err(e) => {
                            tracing::warn!(error = %e, "Skipping unreadable entry during cleanup");
                            None
                        }
                    })
                    .filter(|entry| entry.file_type().is_file())
                    .map(|entry| entry.into_path())
            })
            .collect();

        tracing::info!(files = files.len(), "Running startup cleanup");

        let runs = files.into_iter().map(|path| {
            let workers = Arc::clone(&self.workers);
            async move {
                let _permit = workers.acquire_owned().await.ok()?;
                self.handle(FileEvent::created(path)).await
            }
        });

        futures::future::join_all(runs)
            .await
            .into_iter()
            .flatten()
            .collect()
    }
}
