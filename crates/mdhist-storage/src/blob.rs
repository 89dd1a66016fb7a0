//! Snapshot blob storage
//!
//! One blob per snapshot, stored next to the file's index.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mdhist_core::paths::build_snapshot_path;
use mdhist_core::{Snapshot, decompress_content};
use tracing::debug;

use crate::Result;
use crate::io::HistoryIo;

#[derive(Clone)]
pub struct BlobStore {
    root: PathBuf,
    io: Arc<dyn HistoryIo>,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>, io: Arc<dyn HistoryIo>) -> Self {
        Self {
            root: root.into(),
            io,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn blob_path(&self, file_path: &str, snapshot_id: &str) -> Result<PathBuf> {
        Ok(build_snapshot_path(&self.root, file_path, snapshot_id)?)
    }

    /// Write encoded bytes for a snapshot, creating its directory
    pub async fn store(&self, file_path: &str, snapshot_id: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.blob_path(file_path, snapshot_id)?;
        if let Some(parent) = path.parent() {
            self.io.create_dir_all(parent).await?;
        }
        self.io.write_file(&path, bytes).await?;
        debug!("Stored blob {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    pub async fn retrieve(&self, file_path: &str, snapshot_id: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(file_path, snapshot_id)?;
        self.io.read_file(&path).await
    }

    /// Decoded text of a snapshot
    pub async fn read_content(&self, snapshot: &Snapshot) -> Result<String> {
        let bytes = self.retrieve(&snapshot.file_path, &snapshot.id).await?;
        Ok(decompress_content(&bytes))
    }

    pub async fn remove(&self, file_path: &str, snapshot_id: &str) -> Result<()> {
        let path = self.blob_path(file_path, snapshot_id)?;
        self.io.delete(&path).await
    }

    pub async fn exists(&self, file_path: &str, snapshot_id: &str) -> bool {
        match self.blob_path(file_path, snapshot_id) {
            Ok(path) => self.io.exists(&path).await,
            Err(_) => false,
        }
    }
}
