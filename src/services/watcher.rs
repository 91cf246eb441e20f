use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebouncedEvent, Debouncer, RecommendedCache};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::ConfigStore;

/// Debounce window for filesystem events
const DEBOUNCE: Duration = Duration::from_millis(500);

/// Kind of filesystem transition that produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Created,
    /// A file was renamed into place; the event path is the destination
    Renamed,
}

/// A new or renamed file seen in a watched directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
}

impl FileEvent {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FileEventKind::Created,
        }
    }

    pub fn renamed(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FileEventKind::Renamed,
        }
    }
}

/// Individual folder watcher
#[allow(dead_code)]
struct FolderWatcher {
    debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    path: PathBuf,
}

/// Non-recursive watchers over the inbox folders plus the config file.
/// Dropping the service stops all of them.
#[derive(Default)]
pub struct WatchService {
    /// Map of folder path -> watcher
    watchers: HashMap<PathBuf, FolderWatcher>,
    config_watcher: Option<FolderWatcher>,
}

impl WatchService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch a folder, forwarding new and renamed-in files to `tx`
    pub fn add_folder(&mut self, path: &Path, tx: mpsc::Sender<FileEvent>) -> Result<(), String> {
        if self.watchers.contains_key(path) {
            return Ok(());
        }
        if !path.is_dir() {
            return Err(format!("Path is not a directory: {}", path.display()));
        }

        let watched_folder = path.to_path_buf();
        let mut debouncer = new_debouncer(
            DEBOUNCE,
            None,
            move |result: Result<Vec<DebouncedEvent>, Vec<notify::Error>>| match result {
                Ok(events) => {
                    for event in events {
                        for file_event in translate_event(&event) {
                            // The receiver is gone once the coordinator stops
                            if tx.blocking_send(file_event).is_err() {
                                return;
                            }
                        }
                    }
                }
                Err(errors) => {
                    for error in errors {
                        tracing::warn!(folder = %watched_folder.display(), error = ?error, "Watcher error");
                    }
                }
            },
        )
        .map_err(|e| format!("Failed to create watcher: {}", e))?;

        debouncer
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| format!("Failed to watch path: {}", e))?;

        tracing::info!(folder = %path.display(), "Watching folder");
        self.watchers.insert(
            path.to_path_buf(),
            FolderWatcher {
                debouncer,
                path: path.to_path_buf(),
            },
        );
        Ok(())
    }

    /// Reload `store` whenever its backing file changes
    pub fn watch_config(&mut self, store: Arc<ConfigStore>) -> Result<(), String> {
        let Some(config_path) = store.path().map(Path::to_path_buf) else {
            return Ok(());
        };
        let Some(dir) = config_path.parent().map(Path::to_path_buf) else {
            return Ok(());
        };

        let target = config_path.clone();
        let mut debouncer = new_debouncer(
            DEBOUNCE,
            None,
            move |result: Result<Vec<DebouncedEvent>, Vec<notify::Error>>| {
                let Ok(events) = result else {
                    return;
                };
                let touched = events.iter().any(|event| {
                    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
                        && event.paths.iter().any(|p| p == &target)
                });
                if touched {
                    if let Err(e) = store.reload() {
                        tracing::warn!(error = %e, "Config reload failed, keeping previous rules");
                    }
                }
            },
        )
        .map_err(|e| format!("Failed to create config watcher: {}", e))?;

        debouncer
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| format!("Failed to watch config directory: {}", e))?;

        self.config_watcher = Some(FolderWatcher {
            debouncer,
            path: config_path,
        });
        Ok(())
    }

    /// Get all paths being watched
    pub fn watched_folders(&self) -> Vec<PathBuf> {
        self.watchers.keys().cloned().collect()
    }
}

/// Map a debounced notify event to sorter events
pub fn translate_event(event: &DebouncedEvent) -> Vec<FileEvent> {
    match event.kind {
        EventKind::Create(_) => event.paths.iter().map(FileEvent::created).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.iter().map(FileEvent::renamed).collect()
        }
        // Both: paths are [from, to]
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().map(FileEvent::renamed).into_iter().collect()
        }
        _ => Vec::new(),
    }
}
