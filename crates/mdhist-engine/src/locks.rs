//! Per-index async locks
//!
//! Every read-modify-write of an index runs under the lock of that index
//! file, so two triggers for the same document never lose each other's entry.
//! An entry lives only while some task holds or waits for its lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<PathBuf, Arc<Mutex<()>>>;

#[derive(Debug, Default)]
pub struct PathLocks {
    locks: Arc<LockMap>,
}

/// Exclusive access to one path, released on drop
#[derive(Debug)]
pub struct PathGuard {
    guard: Option<OwnedMutexGuard<()>>,
    path: PathBuf,
    locks: Arc<LockMap>,
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold a clone of the mutex, so only idle entries go
        self.locks
            .remove_if(&self.path, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `path`
    pub async fn lock(&self, path: &Path) -> PathGuard {
        let mutex = self
            .locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        let guard = mutex.lock_owned().await;
        PathGuard {
            guard: Some(guard),
            path: path.to_path_buf(),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Number of paths currently locked or waited on
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
