//! The classification and relocation engine.

pub mod classifier;
pub mod extractor;
pub mod naming;
pub mod path_lock;
pub mod pipeline;
pub mod relocation;
pub mod stability;
pub mod stats;

pub use classifier::{classify, ClassificationInput, ClassificationResult, RuleMatch};
pub use extractor::{extract, ExtractedText, ExtractionKind};
pub use naming::{ExternalRenamer, NamingContext, NamingOptions, NamingPolicy, RenamerError};
pub use path_lock::{PathLockGuard, PathLocks};
pub use pipeline::{Pipeline, ProcessOutcome};
pub use relocation::{relocate, resolve, RelocationError, RelocationOutcome};
pub use stability::{Stability, StabilityDetector};
pub use stats::{SortStats, StatsSnapshot};
