pub mod coordinator;
pub mod watcher;

pub use coordinator::{admit, Admission, EventCoordinator, FilterReason};
pub use watcher::{translate_event, FileEvent, FileEventKind, WatchService};
