//! History engine for mdhist
//!
//! Wires the storage layer to the triggers a host reports (saves, edits,
//! manual checkpoints) and to the actions a user takes on a snapshot.

pub mod actions;
pub mod diff;
pub mod locks;
pub mod orchestrator;
pub mod scheduler;

pub use actions::{EditorHost, HistoryActions, NotifyLevel, RestoreOutcome, display_time};
pub use diff::{DiffLine, DiffLineKind, TextDiffResult, compute_text_diff};
pub use locks::{PathGuard, PathLocks};
pub use orchestrator::{HistoryOrchestrator, PruneOutcome, PrunePlan, PruneReport, Trigger};
pub use scheduler::{DocumentSource, IntervalScheduler};
