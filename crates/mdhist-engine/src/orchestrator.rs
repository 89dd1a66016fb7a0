//! Snapshot creation, lookup and pruning for one history root

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use mdhist_config::{HistoryConfig, HistoryMode};
use mdhist_core::{
    Clock, PRE_RESTORE_LABEL, Snapshot, SystemClock, checkpoint_label, compress_content,
    compute_hash, epoch_millis, is_duplicate, normalize_logical_path, snapshot_id_at,
    snapshots_to_delete,
};
use mdhist_storage::{BlobStore, HistoryIo, IndexStore};
use tracing::{debug, info, warn};

use crate::locks::PathLocks;

/// What caused a snapshot to be taken
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Save,
    Interval,
    Checkpoint { label: String },
    PreRestore,
}

impl Trigger {
    /// Checkpoints and pre-restore captures are always recorded
    fn deduplicates(&self) -> bool {
        matches!(self, Trigger::Save | Trigger::Interval)
    }

    fn label(&self) -> Option<String> {
        match self {
            Trigger::Checkpoint { label } => Some(label.clone()),
            Trigger::PreRestore => Some(PRE_RESTORE_LABEL.to_string()),
            Trigger::Save | Trigger::Interval => None,
        }
    }

    fn is_checkpoint(&self) -> bool {
        matches!(self, Trigger::Checkpoint { .. })
    }
}

/// Counters of a completed prune
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Snapshots considered across every index
    pub examined: usize,
    pub snapshots_removed: usize,
    pub blobs_deleted: usize,
    pub indexes_updated: usize,
    pub bytes_freed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneOutcome {
    Completed(PruneReport),
    /// Another prune was still running; nothing was done
    AlreadyRunning,
}

/// Snapshots a prune would delete, without touching storage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrunePlan {
    pub examined: usize,
    pub snapshots: Vec<Snapshot>,
}

impl PrunePlan {
    pub fn bytes(&self) -> u64 {
        self.snapshots.iter().map(|s| s.size_bytes).sum()
    }
}

/// Clears the prune flag on every exit path
struct PruneGuard<'a>(&'a AtomicBool);

impl Drop for PruneGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct HistoryOrchestrator {
    config: HistoryConfig,
    indexes: IndexStore,
    blobs: BlobStore,
    clock: Arc<dyn Clock>,
    locks: PathLocks,
    pruning: AtomicBool,
}

impl HistoryOrchestrator {
    pub fn new(root: impl Into<PathBuf>, io: Arc<dyn HistoryIo>, config: HistoryConfig) -> Self {
        Self::with_clock(root, io, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        root: impl Into<PathBuf>,
        io: Arc<dyn HistoryIo>,
        config: HistoryConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let root = root.into();
        Self {
            config,
            indexes: IndexStore::new(root.clone(), Arc::clone(&io)),
            blobs: BlobStore::new(root, io),
            clock,
            locks: PathLocks::new(),
            pruning: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        self.indexes.root()
    }

    /// Whether automatic triggers apply to this document at all
    pub fn tracks(&self, file_path: &str) -> bool {
        let lower = file_path.to_ascii_lowercase();
        lower.ends_with(".md") || lower.ends_with(".markdown")
    }

    fn accepts(&self, mode: HistoryMode, file_path: &str) -> bool {
        self.config.enabled && self.config.mode == mode && self.tracks(file_path)
    }

    pub fn accepts_save(&self, file_path: &str) -> bool {
        self.accepts(HistoryMode::OnSave, file_path)
    }

    pub fn accepts_interval(&self, file_path: &str) -> bool {
        self.accepts(HistoryMode::Interval, file_path)
    }

    /// A document was saved. Returns the new snapshot, if one was taken.
    pub async fn on_save(&self, file_path: &str, content: &str) -> Option<Snapshot> {
        if !self.accepts_save(file_path) {
            return None;
        }
        self.record_automatic(file_path, content, Trigger::Save).await
    }

    /// A document's quiet period elapsed
    pub async fn on_interval(&self, file_path: &str, content: &str) -> Option<Snapshot> {
        if !self.accepts_interval(file_path) {
            return None;
        }
        self.record_automatic(file_path, content, Trigger::Interval).await
    }

    async fn record_automatic(
        &self,
        file_path: &str,
        content: &str,
        trigger: Trigger,
    ) -> Option<Snapshot> {
        match self.create_snapshot(file_path, content, trigger).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failed to create snapshot for {}: {:#}", file_path, e);
                None
            }
        }
    }

    /// Labelled snapshot that is never deduplicated
    pub async fn checkpoint(&self, file_path: &str, content: &str, label: &str) -> Result<Snapshot> {
        let label = checkpoint_label(label)?;
        let snapshot = self
            .create_snapshot(file_path, content, Trigger::Checkpoint { label })
            .await?;
        snapshot.ok_or_else(|| anyhow::anyhow!("Checkpoint for {} was not recorded", file_path))
    }

    /// Capture the content about to be overwritten by a restore. Failures
    /// are logged and reported as `None`.
    pub async fn capture_pre_restore(&self, file_path: &str, content: &str) -> Option<Snapshot> {
        if !self.config.create_pre_restore_snapshot {
            return None;
        }
        match self
            .create_snapshot(file_path, content, Trigger::PreRestore)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failed to create pre-restore snapshot for {}: {:#}", file_path, e);
                None
            }
        }
    }

    /// Write a snapshot for `file_path`. Returns `None` when the content
    /// matches the last recorded snapshot and the trigger deduplicates.
    pub async fn create_snapshot(
        &self,
        file_path: &str,
        content: &str,
        trigger: Trigger,
    ) -> Result<Option<Snapshot>> {
        let logical = normalize_logical_path(file_path)?;
        let index_path = self.indexes.index_path(&logical)?;
        let _guard = self.locks.lock(&index_path).await;

        let mut index = self.indexes.read_at(&index_path).await;
        if trigger.deduplicates()
            && is_duplicate(content, index.last_inserted().map(|s| s.hash.as_str()))
        {
            debug!("Skipping duplicate snapshot for {}", logical);
            return Ok(None);
        }

        let mut at = self.clock.now();
        let mut id = snapshot_id_at(at);
        while index.contains_id(&id) {
            at += time::Duration::milliseconds(1);
            id = snapshot_id_at(at);
        }

        let encoded = compress_content(content, self.config.snapshot_compression)?;
        self.blobs.store(&logical, &id, &encoded.bytes).await?;

        let snapshot = Snapshot {
            id,
            file_path: logical,
            timestamp: epoch_millis(at),
            label: trigger.label(),
            is_checkpoint: trigger.is_checkpoint(),
            hash: compute_hash(content),
            size_bytes: encoded.size_bytes(),
            compressed: encoded.compressed,
        };
        index.push(snapshot.clone());
        self.indexes.write_at(&index_path, &index).await?;

        info!(
            "Created snapshot {} for {} ({} bytes{})",
            snapshot.id,
            snapshot.file_path,
            snapshot.size_bytes,
            if snapshot.compressed { ", gzip" } else { "" }
        );
        Ok(Some(snapshot))
    }

    /// Every snapshot of a file, newest first
    pub async fn list(&self, file_path: &str) -> Result<Vec<Snapshot>> {
        let logical = normalize_logical_path(file_path)?;
        Ok(self.indexes.read(&logical).await?.newest_first())
    }

    pub async fn find(&self, file_path: &str, snapshot_id: &str) -> Result<Option<Snapshot>> {
        let logical = normalize_logical_path(file_path)?;
        Ok(self.indexes.read(&logical).await?.find(snapshot_id).cloned())
    }

    pub async fn latest(&self, file_path: &str) -> Result<Option<Snapshot>> {
        Ok(self.list(file_path).await?.into_iter().next())
    }

    pub async fn read_content(&self, snapshot: &Snapshot) -> Result<String> {
        Ok(self.blobs.read_content(snapshot).await?)
    }

    /// What a prune at `now_ms` would delete
    pub async fn plan_prune(&self, now_ms: i64) -> Result<PrunePlan> {
        let files = self.indexes.collect().await?;
        let all: Vec<Snapshot> = files
            .into_iter()
            .flat_map(|file| file.index.snapshots)
            .collect();
        let snapshots = snapshots_to_delete(&all, &self.config.retention_policy(), now_ms);
        Ok(PrunePlan {
            examined: all.len(),
            snapshots,
        })
    }

    pub async fn prune(&self) -> Result<PruneOutcome> {
        self.prune_at(epoch_millis(self.clock.now())).await
    }

    /// Apply retention across the whole history root
    pub async fn prune_at(&self, now_ms: i64) -> Result<PruneOutcome> {
        if self.pruning.swap(true, Ordering::AcqRel) {
            debug!("Prune already running, ignoring request");
            return Ok(PruneOutcome::AlreadyRunning);
        }
        let _guard = PruneGuard(&self.pruning);

        let files = self.indexes.collect().await?;
        let all: Vec<Snapshot> = files
            .iter()
            .flat_map(|file| file.index.snapshots.iter().cloned())
            .collect();
        let plan = snapshots_to_delete(&all, &self.config.retention_policy(), now_ms);

        let mut report = PruneReport {
            examined: all.len(),
            ..PruneReport::default()
        };
        if plan.is_empty() {
            return Ok(PruneOutcome::Completed(report));
        }

        for snapshot in &plan {
            match self.blobs.remove(&snapshot.file_path, &snapshot.id).await {
                Ok(()) => {
                    report.blobs_deleted += 1;
                    report.bytes_freed += snapshot.size_bytes;
                }
                Err(e) => debug!(
                    "Could not delete blob {} of {}: {}",
                    snapshot.id, snapshot.file_path, e
                ),
            }
        }

        let mut doomed: HashMap<String, HashSet<String>> = HashMap::new();
        for snapshot in plan {
            doomed
                .entry(snapshot.file_path)
                .or_default()
                .insert(snapshot.id);
        }
        let is_doomed = |s: &Snapshot| {
            doomed
                .get(&s.file_path)
                .is_some_and(|ids| ids.contains(&s.id))
        };

        for file in files {
            if !file.index.snapshots.iter().any(is_doomed) {
                continue;
            }

            // Triggers may have appended since the collect; re-read under the lock
            let _lock = self.locks.lock(&file.path).await;
            let mut index = self.indexes.read_at(&file.path).await;
            let removed = index.remove_where(is_doomed);
            if removed == 0 {
                continue;
            }
            if let Err(e) = self.indexes.write_at(&file.path, &index).await {
                warn!("Failed to rewrite index {}: {}", file.path.display(), e);
                continue;
            }
            report.snapshots_removed += removed;
            report.indexes_updated += 1;
        }

        info!(
            "Pruned {} snapshot(s) from {} index file(s)",
            report.snapshots_removed, report.indexes_updated
        );
        Ok(PruneOutcome::Completed(report))
    }
}
