//! Local file system implementation of [`HistoryIo`]

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::io::{DirEntry, EntryKind, HistoryIo};
use crate::{Result, StorageError};

#[derive(Debug, Clone, Copy, Default)]
pub struct FsIo;

impl FsIo {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HistoryIo for FsIo {
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| StorageError::from_io(e, path))
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| StorageError::from_io(e, path))
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path).await?;
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| StorageError::from_io(e, path))
    }

    async fn list_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let mut dir_entries = tokio::fs::read_dir(path)
            .await
            .map_err(|e| StorageError::from_io(e, path))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir_entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let file_type = entry.file_type().await?;
            let kind = if file_type.is_dir() {
                EntryKind::Directory
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                EntryKind::Other
            };
            entries.push(DirEntry { name, kind });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn walk_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let root = root.to_path_buf();
        let files = tokio::task::spawn_blocking(move || {
            if !root.exists() {
                return Vec::new();
            }
            let mut files: Vec<PathBuf> = walkdir::WalkDir::new(&root)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .collect();
            files.sort();
            files
        })
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        Ok(files)
    }
}
