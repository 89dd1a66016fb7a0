//! IO capability consumed by the history core
//!
//! The host (an editor, the CLI, a test) decides how bytes reach storage;
//! the history core only ever goes through this trait.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Other,
}

/// One child of a listed directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

#[async_trait]
pub trait HistoryIo: Send + Sync {
    /// Read a whole file. Missing files yield [`crate::StorageError::NotFound`].
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    /// Create or fully overwrite a file. The parent directory must exist.
    async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()>;

    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    async fn delete(&self, path: &Path) -> Result<()>;

    async fn list_dir(&self, path: &Path) -> Result<Vec<DirEntry>>;

    /// Whether `path` is a regular file. Never reads the file's contents.
    async fn exists(&self, path: &Path) -> bool {
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return false;
        };
        match self.list_dir(parent).await {
            Ok(entries) => entries
                .iter()
                .any(|e| e.kind == EntryKind::File && name == e.name.as_str()),
            Err(_) => false,
        }
    }

    /// Every regular file below `root`, sorted. Directories that cannot be
    /// listed are skipped; a missing root yields nothing.
    async fn walk_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let entries = match self.list_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::debug!("Skipping unreadable directory {}: {}", dir.display(), e);
                    continue;
                }
            };

            for entry in entries {
                let child = dir.join(&entry.name);
                match entry.kind {
                    EntryKind::Directory => pending.push(child),
                    EntryKind::File => files.push(child),
                    EntryKind::Other => {}
                }
            }
        }

        files.sort();
        Ok(files)
    }
}
