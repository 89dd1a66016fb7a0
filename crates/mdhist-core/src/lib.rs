//! Core domain models and logic for mdhist
//!
//! This crate contains:
//! - Domain models (Snapshot, SnapshotIndex)
//! - Content store (hashing, compression, dedup)
//! - Path resolver for the history root layout
//! - Retention engine (pure eviction planning)

pub mod clock;
pub mod content;
pub mod error;
pub mod paths;
pub mod retention;
pub mod snapshot;

pub use clock::{Clock, ManualClock, SystemClock, epoch_millis};
pub use content::{
    CompressionMode, EncodedContent, compress_content, compute_hash, decompress_content,
    is_duplicate,
};
pub use error::{Error, Result};
pub use paths::{build_index_path, build_snapshot_path, normalize_logical_path};
pub use retention::{RetentionPolicy, snapshots_to_delete};
pub use snapshot::{
    INDEX_VERSION, PRE_RESTORE_LABEL, Snapshot, SnapshotIndex, checkpoint_label,
    is_valid_snapshot_id, snapshot_id_at,
};
