//! Per-file snapshot index persistence
//!
//! An index that is missing or unreadable is an empty index: the first
//! snapshot of a file always starts from nothing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mdhist_core::paths::{build_index_path, is_index_file_name};
use mdhist_core::{INDEX_VERSION, Snapshot, SnapshotIndex};
use serde_json::Value;
use tracing::{debug, warn};

use crate::Result;
use crate::io::HistoryIo;

/// An index together with the file it was read from
#[derive(Debug, Clone)]
pub struct IndexFile {
    pub path: PathBuf,
    pub index: SnapshotIndex,
}

/// Parse an index document.
///
/// Returns `None` when the document does not have the index shape (not
/// JSON, not an object, unknown version, `snapshots` not an array).
/// Individual entries that are not snapshots are dropped.
pub fn parse_index(bytes: &[u8]) -> Option<SnapshotIndex> {
    let value: Value = serde_json::from_slice(bytes).ok()?;
    let object = value.as_object()?;

    if let Some(version) = object.get("version") {
        if version.as_u64() != Some(u64::from(INDEX_VERSION)) {
            return None;
        }
    }

    let entries = object.get("snapshots")?.as_array()?;
    let snapshots = entries
        .iter()
        .filter_map(|entry| match serde_json::from_value::<Snapshot>(entry.clone()) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("Dropping malformed index entry: {}", e);
                None
            }
        })
        .collect();

    Some(SnapshotIndex {
        version: INDEX_VERSION,
        snapshots,
    })
}

/// Pretty JSON with two-space indentation
pub fn serialize_index(index: &SnapshotIndex) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(index)?)
}

/// Reads and writes the indexes under one history root
#[derive(Clone)]
pub struct IndexStore {
    root: PathBuf,
    io: Arc<dyn HistoryIo>,
}

impl IndexStore {
    pub fn new(root: impl Into<PathBuf>, io: Arc<dyn HistoryIo>) -> Self {
        Self {
            root: root.into(),
            io,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self, file_path: &str) -> Result<PathBuf> {
        Ok(build_index_path(&self.root, file_path)?)
    }

    /// Index of a logical file; only an invalid logical path is an error
    pub async fn read(&self, file_path: &str) -> Result<SnapshotIndex> {
        let path = self.index_path(file_path)?;
        Ok(self.read_at(&path).await)
    }

    pub async fn read_at(&self, path: &Path) -> SnapshotIndex {
        let bytes = match self.io.read_file(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => {
                debug!("No index at {}, starting fresh", path.display());
                return SnapshotIndex::new();
            }
            Err(e) => {
                warn!("Failed to read index {}: {}", path.display(), e);
                return SnapshotIndex::new();
            }
        };

        parse_index(&bytes).unwrap_or_else(|| {
            warn!("Unrecognized index at {}, treating as empty", path.display());
            SnapshotIndex::new()
        })
    }

    pub async fn write(&self, file_path: &str, index: &SnapshotIndex) -> Result<()> {
        let path = self.index_path(file_path)?;
        self.write_at(&path, index).await
    }

    /// Overwrite the whole index file
    pub async fn write_at(&self, path: &Path, index: &SnapshotIndex) -> Result<()> {
        let bytes = serialize_index(index)?;
        self.io.write_file(path, &bytes).await
    }

    /// Every parseable index under the root. Unparseable index files are
    /// skipped so they are never rewritten.
    pub async fn collect(&self) -> Result<Vec<IndexFile>> {
        let files = self.io.walk_files(&self.root).await?;
        let mut result = Vec::new();

        for path in files {
            let is_index = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_index_file_name);
            if !is_index {
                continue;
            }

            let bytes = match self.io.read_file(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Skipping unreadable index {}: {}", path.display(), e);
                    continue;
                }
            };

            match parse_index(&bytes) {
                Some(index) => result.push(IndexFile { path, index }),
                None => warn!("Skipping invalid index {}", path.display()),
            }
        }

        Ok(result)
    }
}
