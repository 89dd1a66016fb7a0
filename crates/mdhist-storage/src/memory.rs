//! In-memory implementation of [`HistoryIo`]
//!
//! Behaves like a small file system: writes need an existing parent
//! directory, deletes of missing files fail. Writes can be switched off to
//! simulate a read-only or full disk.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::io::{DirEntry, EntryKind, HistoryIo};
use crate::{Result, StorageError};

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
    read_only: bool,
}

#[derive(Debug, Default)]
pub struct MemoryIo {
    state: Mutex<MemoryState>,
}

impl MemoryIo {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every subsequent write, mkdir and delete fail
    pub fn set_read_only(&self, read_only: bool) {
        self.state().read_only = read_only;
    }

    /// Seed a file, creating its ancestors
    pub fn insert_file(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        let path = path.into();
        let mut state = self.state();
        if let Some(parent) = path.parent() {
            insert_ancestors(&mut state.dirs, parent);
        }
        state.files.insert(path, contents.into());
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.state().files.contains_key(path)
    }

    pub fn file_paths(&self) -> Vec<PathBuf> {
        self.state().files.keys().cloned().collect()
    }
}

fn insert_ancestors(dirs: &mut BTreeSet<PathBuf>, dir: &Path) {
    for ancestor in dir.ancestors() {
        if ancestor.as_os_str().is_empty() {
            continue;
        }
        dirs.insert(ancestor.to_path_buf());
    }
}

fn read_only_error() -> StorageError {
    StorageError::Io(std::io::Error::new(
        std::io::ErrorKind::PermissionDenied,
        "storage is read-only",
    ))
}

#[async_trait]
impl HistoryIo for MemoryIo {
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        self.state()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_path_buf()))
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut state = self.state();
        if state.read_only {
            return Err(read_only_error());
        }
        let parent_exists = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => state.dirs.contains(parent),
            _ => true,
        };
        if !parent_exists {
            return Err(StorageError::NotFound(path.to_path_buf()));
        }
        state.files.insert(path.to_path_buf(), contents.to_vec());
        Ok(())
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut state = self.state();
        if state.read_only {
            return Err(read_only_error());
        }
        insert_ancestors(&mut state.dirs, path);
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let mut state = self.state();
        if state.read_only {
            return Err(read_only_error());
        }
        state
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(path.to_path_buf()))
    }

    async fn exists(&self, path: &Path) -> bool {
        self.contains(path)
    }

    async fn list_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let state = self.state();
        if !state.dirs.contains(path) {
            return Err(StorageError::NotFound(path.to_path_buf()));
        }

        let child_name = |child: &Path| -> Option<String> {
            if child.parent() != Some(path) {
                return None;
            }
            child.file_name()?.to_str().map(String::from)
        };

        let mut entries: Vec<DirEntry> = state
            .dirs
            .iter()
            .filter_map(|d| child_name(d.as_path()))
            .map(|name| DirEntry {
                name,
                kind: EntryKind::Directory,
            })
            .chain(
                state
                    .files
                    .keys()
                    .filter_map(|f| child_name(f.as_path()))
                    .map(|name| DirEntry {
                        name,
                        kind: EntryKind::File,
                    }),
            )
            .collect();

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
