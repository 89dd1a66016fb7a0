//! Snapshot domain model

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, Result};

/// Current on-disk index schema version
pub const INDEX_VERSION: u32 = 1;

/// Label given to the safety snapshot taken right before a restore
pub const PRE_RESTORE_LABEL: &str = "pre-restore";

/// Immutable capture of a file's content at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: String,
    /// Logical path relative to the workspace, `/`-separated
    pub file_path: String,
    /// Creation instant in epoch milliseconds
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub is_checkpoint: bool,
    /// Digest of the uncompressed text
    pub hash: String,
    /// Size of the stored blob, not of the logical text
    pub size_bytes: u64,
    pub compressed: bool,
}

impl Snapshot {
    /// Identity of a snapshot across a whole history root
    pub fn key(&self) -> (&str, &str) {
        (&self.file_path, &self.id)
    }

    pub fn created_at(&self) -> Option<OffsetDateTime> {
        let nanos = i128::from(self.timestamp) * 1_000_000;
        OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
    }

    pub fn is_pre_restore(&self) -> bool {
        !self.is_checkpoint && self.label.as_deref() == Some(PRE_RESTORE_LABEL)
    }
}

/// Per-file manifest of snapshots, in insertion order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotIndex {
    pub version: u32,
    pub snapshots: Vec<Snapshot>,
}

impl SnapshotIndex {
    pub fn new() -> Self {
        Self {
            version: INDEX_VERSION,
            snapshots: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Last inserted entry. This is what dedup compares against, which is
    /// not necessarily the newest entry by timestamp.
    pub fn last_inserted(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.snapshots.iter().any(|s| s.id == id)
    }

    pub fn find(&self, id: &str) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.id == id)
    }

    pub fn push(&mut self, snapshot: Snapshot) {
        self.snapshots.push(snapshot);
    }

    /// Snapshots sorted newest first
    pub fn newest_first(&self) -> Vec<Snapshot> {
        let mut sorted = self.snapshots.clone();
        sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        sorted
    }

    /// Drop every entry matching `remove`, returning how many were dropped
    pub fn remove_where<F>(&mut self, mut remove: F) -> usize
    where
        F: FnMut(&Snapshot) -> bool,
    {
        let before = self.snapshots.len();
        self.snapshots.retain(|s| !remove(s));
        before - self.snapshots.len()
    }
}

impl Default for SnapshotIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a snapshot id as `YYYYMMDD-HHmmss-SSS` in the date-time's own offset
pub fn snapshot_id_at(at: OffsetDateTime) -> String {
    format!(
        "{:04}{:02}{:02}-{:02}{:02}{:02}-{:03}",
        at.year(),
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute(),
        at.second(),
        at.millisecond()
    )
}

/// Trimmed checkpoint label; blank labels are rejected
pub fn checkpoint_label(raw: &str) -> Result<String> {
    let label = raw.trim();
    if label.is_empty() {
        return Err(Error::InvalidLabel);
    }
    Ok(label.to_string())
}

/// Whether `id` has the `YYYYMMDD-HHmmss-SSS` shape
pub fn is_valid_snapshot_id(id: &str) -> bool {
    let bytes = id.as_bytes();
    if bytes.len() != 19 || bytes[8] != b'-' || bytes[15] != b'-' {
        return false;
    }
    bytes
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != 8 && *i != 15)
        .all(|(_, b)| b.is_ascii_digit())
}
