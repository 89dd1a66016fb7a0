use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use mdhist_config::{HistoryConfig, HistoryMode};
use mdhist_core::{Clock, ManualClock, Snapshot, epoch_millis};
use mdhist_engine::{
    DocumentSource, EditorHost, HistoryActions, HistoryOrchestrator, IntervalScheduler,
    NotifyLevel, PruneOutcome, RestoreOutcome, TextDiffResult,
};
use mdhist_storage::{DirEntry, FsIo, HistoryIo, MemoryIo};
use time::macros::datetime;
use tokio::sync::Notify;

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(datetime!(2024-05-01 10:00:00 UTC)))
}

fn memory_orchestrator(config: HistoryConfig) -> (Arc<HistoryOrchestrator>, Arc<ManualClock>) {
    let clock = clock();
    let orchestrator = HistoryOrchestrator::with_clock(
        "/work/.mdhist/history",
        Arc::new(MemoryIo::new()),
        config,
        clock.clone(),
    );
    (Arc::new(orchestrator), clock)
}

#[derive(Default)]
struct RecordingHost {
    decline: bool,
    reject_edit: bool,
    notifications: Mutex<Vec<(NotifyLevel, String)>>,
    shown: Mutex<Vec<(String, String)>>,
    replaced: Mutex<Option<(String, String)>>,
    clipboard: Mutex<Option<String>>,
}

impl RecordingHost {
    fn notifications(&self) -> Vec<(NotifyLevel, String)> {
        self.notifications.lock().unwrap().clone()
    }
}

#[async_trait]
impl EditorHost for RecordingHost {
    async fn confirm(&self, _message: &str) -> bool {
        !self.decline
    }

    async fn show_snapshot(&self, title: &str, content: &str) -> Result<()> {
        self.shown
            .lock()
            .unwrap()
            .push((title.to_string(), content.to_string()));
        Ok(())
    }

    async fn show_diff(&self, title: &str, _diff: &TextDiffResult) -> Result<()> {
        self.shown
            .lock()
            .unwrap()
            .push((title.to_string(), String::new()));
        Ok(())
    }

    async fn replace_document(&self, file_path: &str, content: &str) -> Result<bool> {
        if self.reject_edit {
            return Ok(false);
        }
        *self.replaced.lock().unwrap() = Some((file_path.to_string(), content.to_string()));
        Ok(true)
    }

    async fn write_clipboard(&self, text: &str) -> Result<()> {
        *self.clipboard.lock().unwrap() = Some(text.to_string());
        Ok(())
    }

    fn notify(&self, level: NotifyLevel, message: &str) {
        self.notifications
            .lock()
            .unwrap()
            .push((level, message.to_string()));
    }
}

#[derive(Default)]
struct OpenDocuments {
    texts: Mutex<HashMap<String, String>>,
}

impl OpenDocuments {
    fn set(&self, file_path: &str, text: &str) {
        self.texts
            .lock()
            .unwrap()
            .insert(file_path.to_string(), text.to_string());
    }

    fn close(&self, file_path: &str) {
        self.texts.lock().unwrap().remove(file_path);
    }
}

#[async_trait]
impl DocumentSource for OpenDocuments {
    async fn current_text(&self, file_path: &str) -> Option<String> {
        self.texts.lock().unwrap().get(file_path).cloned()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Gated {
    Walk,
    Delete,
}

/// Holds every call of the gated operation until released
struct GatedIo {
    inner: MemoryIo,
    gated: Gated,
    entered: Notify,
    release: Notify,
}

impl GatedIo {
    fn new(gated: Gated) -> Self {
        Self {
            inner: MemoryIo::new(),
            gated,
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    async fn pass(&self, op: Gated) {
        if self.gated == op {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }
}

#[async_trait]
impl HistoryIo for GatedIo {
    async fn read_file(&self, path: &Path) -> mdhist_storage::Result<Vec<u8>> {
        self.inner.read_file(path).await
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> mdhist_storage::Result<()> {
        self.inner.write_file(path, contents).await
    }

    async fn create_dir_all(&self, path: &Path) -> mdhist_storage::Result<()> {
        self.inner.create_dir_all(path).await
    }

    async fn delete(&self, path: &Path) -> mdhist_storage::Result<()> {
        self.pass(Gated::Delete).await;
        self.inner.delete(path).await
    }

    async fn list_dir(&self, path: &Path) -> mdhist_storage::Result<Vec<DirEntry>> {
        self.inner.list_dir(path).await
    }

    async fn walk_files(&self, root: &Path) -> mdhist_storage::Result<Vec<PathBuf>> {
        self.pass(Gated::Walk).await;
        self.inner.walk_files(root).await
    }
}

#[tokio::test]
async fn test_save_dedup_and_checkpoint_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join(".mdhist/history");
    let orchestrator = HistoryOrchestrator::with_clock(
        &root,
        Arc::new(FsIo::new()),
        HistoryConfig::default(),
        clock(),
    );

    assert!(orchestrator.on_save("notes.md", "A").await.is_some());
    assert_eq!(orchestrator.list("notes.md").await.unwrap().len(), 1);

    assert!(orchestrator.on_save("notes.md", "A").await.is_none());
    assert_eq!(orchestrator.list("notes.md").await.unwrap().len(), 1);

    assert!(orchestrator.on_save("notes.md", "B").await.is_some());
    assert_eq!(orchestrator.list("notes.md").await.unwrap().len(), 2);

    orchestrator.checkpoint("notes.md", "B", "v1").await.unwrap();

    let index_path = root.join("notes.md.index.json");
    let index: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&index_path).unwrap()).unwrap();
    let snapshots = index["snapshots"].as_array().unwrap();
    assert_eq!(index["version"], 1);
    assert_eq!(snapshots.len(), 3);
    assert_eq!(snapshots[2]["isCheckpoint"], true);
    assert_eq!(snapshots[2]["label"], "v1");

    for entry in snapshots {
        let id = entry["id"].as_str().unwrap();
        assert!(root.join(format!("notes.md.{}.md", id)).exists());
    }
}

#[tokio::test]
async fn test_corrupt_index_reads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("history");
    std::fs::create_dir_all(root.join("docs")).unwrap();
    std::fs::write(root.join("docs/a.md.index.json"), "{ not json").unwrap();
    std::fs::write(
        root.join("docs/b.md.index.json"),
        r#"{ "version": 7, "snapshots": [] }"#,
    )
    .unwrap();

    let orchestrator = HistoryOrchestrator::with_clock(
        &root,
        Arc::new(FsIo::new()),
        HistoryConfig::default(),
        clock(),
    );
    assert!(orchestrator.list("docs/a.md").await.unwrap().is_empty());
    assert!(orchestrator.list("docs/b.md").await.unwrap().is_empty());

    // Prune never rewrites an index it cannot read
    let outcome = orchestrator.prune().await.unwrap();
    assert!(matches!(outcome, PruneOutcome::Completed(ref r) if r.examined == 0));
    assert_eq!(
        std::fs::read_to_string(root.join("docs/a.md.index.json")).unwrap(),
        "{ not json"
    );

    assert!(orchestrator.on_save("docs/a.md", "fresh").await.is_some());
    assert_eq!(orchestrator.list("docs/a.md").await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_saves_keep_every_entry() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Arc::new(HistoryOrchestrator::with_clock(
        dir.path(),
        Arc::new(FsIo::new()),
        HistoryConfig::default(),
        clock(),
    ));

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                orchestrator
                    .on_save("notes.md", &format!("revision {}", i))
                    .await
            })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().is_some());
    }

    let snapshots = orchestrator.list("notes.md").await.unwrap();
    assert_eq!(snapshots.len(), 16);
    let mut ids: Vec<_> = snapshots.iter().map(|s| s.id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 16);
}

#[tokio::test]
async fn test_prune_applies_global_retention() {
    let (orchestrator, clock) = memory_orchestrator(HistoryConfig::default());
    orchestrator.on_save("a.md", "old a").await.unwrap();
    orchestrator.on_save("docs/b.md", "old b").await.unwrap();
    let kept_checkpoint = orchestrator
        .checkpoint("c.md", "milestone", "release")
        .await
        .unwrap();

    clock.advance(time::Duration::days(40));
    let fresh = orchestrator.on_save("a.md", "new a").await.unwrap();

    let PruneOutcome::Completed(report) = orchestrator.prune().await.unwrap() else {
        panic!("prune should run");
    };
    assert_eq!(report.examined, 4);
    assert_eq!(report.snapshots_removed, 2);
    assert_eq!(report.blobs_deleted, 2);
    assert_eq!(report.indexes_updated, 2);
    assert_eq!(report.bytes_freed, 10);

    assert_eq!(orchestrator.list("a.md").await.unwrap(), vec![fresh]);
    assert!(orchestrator.list("docs/b.md").await.unwrap().is_empty());
    assert_eq!(
        orchestrator.list("c.md").await.unwrap(),
        vec![kept_checkpoint]
    );
}

#[tokio::test]
async fn test_overlapping_prune_is_ignored() {
    let io = Arc::new(GatedIo::new(Gated::Walk));
    let orchestrator = Arc::new(HistoryOrchestrator::with_clock(
        "/history",
        io.clone(),
        HistoryConfig::default(),
        clock(),
    ));

    let first = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.prune_at(0).await })
    };
    io.entered.notified().await;

    let second = orchestrator.prune_at(0).await.unwrap();
    assert_eq!(second, PruneOutcome::AlreadyRunning);

    io.release.notify_one();
    let first = first.await.unwrap().unwrap();
    assert!(matches!(first, PruneOutcome::Completed(_)));

    // The guard is released once the first prune finishes
    io.release.notify_one();
    let third = orchestrator.prune_at(0).await.unwrap();
    assert!(matches!(third, PruneOutcome::Completed(_)));
}

#[tokio::test]
async fn test_snapshot_saved_during_prune_survives() {
    let io = Arc::new(GatedIo::new(Gated::Delete));
    let clock = clock();
    let orchestrator = Arc::new(HistoryOrchestrator::with_clock(
        "/history",
        io.clone(),
        HistoryConfig::default(),
        clock.clone(),
    ));

    let expired = orchestrator.on_save("a.md", "1").await.unwrap();
    clock.advance(time::Duration::days(40));
    let recent = orchestrator.on_save("a.md", "2").await.unwrap();

    let prune = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.prune().await })
    };
    io.entered.notified().await;

    // The prune has planned its deletions and is stuck removing the blob
    clock.advance(time::Duration::seconds(1));
    let late = orchestrator.on_save("a.md", "3").await.unwrap();

    io.release.notify_one();
    let PruneOutcome::Completed(report) = prune.await.unwrap().unwrap() else {
        panic!("prune should run");
    };
    assert_eq!(report.examined, 2);
    assert_eq!(report.snapshots_removed, 1);
    assert_eq!(report.indexes_updated, 1);

    let remaining: Vec<String> = orchestrator
        .list("a.md")
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(remaining, vec![late.id.clone(), recent.id]);
    assert!(orchestrator.find("a.md", &expired.id).await.unwrap().is_none());
    assert_eq!(orchestrator.read_content(&late).await.unwrap(), "3");
}

fn interval_config() -> HistoryConfig {
    HistoryConfig {
        mode: HistoryMode::Interval,
        interval_minutes: 1,
        ..HistoryConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_interval_debounce_takes_one_snapshot_per_quiet_period() {
    let (orchestrator, _) = memory_orchestrator(interval_config());
    let docs = Arc::new(OpenDocuments::default());
    let scheduler = IntervalScheduler::new(orchestrator.clone(), docs.clone());
    assert_eq!(scheduler.delay(), Duration::from_secs(60));

    for text in ["draft 1", "draft 2", "draft 3"] {
        docs.set("notes.md", text);
        scheduler.on_change("notes.md");
        tokio::time::sleep(Duration::from_secs(30)).await;
    }
    assert!(orchestrator.list("notes.md").await.unwrap().is_empty());
    assert_eq!(scheduler.pending(), 1);

    tokio::time::sleep(Duration::from_secs(31)).await;
    let snapshots = orchestrator.list("notes.md").await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(
        orchestrator.read_content(&snapshots[0]).await.unwrap(),
        "draft 3"
    );
    assert_eq!(scheduler.pending(), 0);

    // Unchanged text at the next quiet period is deduplicated
    scheduler.on_change("notes.md");
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(orchestrator.list("notes.md").await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_interval_close_and_drop_cancel_timers() {
    let (orchestrator, _) = memory_orchestrator(interval_config());
    let docs = Arc::new(OpenDocuments::default());
    docs.set("a.md", "A");
    docs.set("b.md", "B");

    let scheduler = IntervalScheduler::new(orchestrator.clone(), docs.clone());
    scheduler.on_change("a.md");
    scheduler.on_close("a.md");
    assert_eq!(scheduler.pending(), 0);

    scheduler.on_change("b.md");
    drop(scheduler);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(orchestrator.list("a.md").await.unwrap().is_empty());
    assert!(orchestrator.list("b.md").await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_interval_ignores_untracked_and_vanished_documents() {
    let (orchestrator, _) = memory_orchestrator(interval_config());
    let docs = Arc::new(OpenDocuments::default());
    let scheduler = IntervalScheduler::new(orchestrator.clone(), docs.clone());

    docs.set("main.rs", "fn main() {}");
    scheduler.on_change("main.rs");
    assert_eq!(scheduler.pending(), 0);

    docs.set("gone.md", "bye");
    scheduler.on_change("gone.md");
    docs.close("gone.md");
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(orchestrator.list("gone.md").await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_interval_is_inert_in_on_save_mode() {
    let (orchestrator, _) = memory_orchestrator(HistoryConfig::default());
    let docs = Arc::new(OpenDocuments::default());
    docs.set("a.md", "A");
    let scheduler = IntervalScheduler::new(orchestrator, docs);
    scheduler.on_change("a.md");
    assert_eq!(scheduler.pending(), 0);
}

async fn saved(orchestrator: &HistoryOrchestrator, text: &str) -> Snapshot {
    orchestrator.on_save("notes.md", text).await.unwrap()
}

#[tokio::test]
async fn test_restore_declined_changes_nothing() {
    let (orchestrator, _) = memory_orchestrator(HistoryConfig::default());
    let snapshot = saved(&orchestrator, "old").await;

    let host = Arc::new(RecordingHost {
        decline: true,
        ..RecordingHost::default()
    });
    let actions = HistoryActions::new(orchestrator.clone(), host.clone());

    let outcome = actions.restore(&snapshot, "current").await.unwrap();
    assert_eq!(outcome, RestoreOutcome::Cancelled);
    assert!(host.replaced.lock().unwrap().is_none());
    assert!(host.notifications().is_empty());
    assert_eq!(orchestrator.list("notes.md").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_restore_records_pre_restore_snapshot() {
    let (orchestrator, _) = memory_orchestrator(HistoryConfig::default());
    let snapshot = saved(&orchestrator, "old").await;

    let host = Arc::new(RecordingHost::default());
    let actions = HistoryActions::new(orchestrator.clone(), host.clone());

    let outcome = actions.restore(&snapshot, "current").await.unwrap();
    let RestoreOutcome::Restored {
        pre_restore: Some(pre_restore),
    } = outcome
    else {
        panic!("expected a pre-restore snapshot");
    };
    assert!(pre_restore.is_pre_restore());
    assert_eq!(
        orchestrator.read_content(&pre_restore).await.unwrap(),
        "current"
    );

    assert_eq!(
        host.replaced.lock().unwrap().clone(),
        Some(("notes.md".to_string(), "old".to_string()))
    );
    assert_eq!(
        host.notifications(),
        vec![(
            NotifyLevel::Info,
            "Snapshot restored successfully".to_string()
        )]
    );
    assert_eq!(orchestrator.list("notes.md").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_restore_rejected_edit_is_reported() {
    let (orchestrator, _) = memory_orchestrator(HistoryConfig {
        create_pre_restore_snapshot: false,
        ..HistoryConfig::default()
    });
    let snapshot = saved(&orchestrator, "old").await;

    let host = Arc::new(RecordingHost {
        reject_edit: true,
        ..RecordingHost::default()
    });
    let actions = HistoryActions::new(orchestrator.clone(), host.clone());

    assert!(actions.restore(&snapshot, "current").await.is_err());
    let notifications = host.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].0, NotifyLevel::Error);
    assert!(notifications[0].1.starts_with("Failed to restore snapshot"));
    assert_eq!(orchestrator.list("notes.md").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_view_diff_and_copy() {
    let (orchestrator, _) = memory_orchestrator(HistoryConfig::default());
    let snapshot = saved(&orchestrator, "# Notes\nfirst\n").await;

    let host = Arc::new(RecordingHost::default());
    let actions = HistoryActions::new(orchestrator.clone(), host.clone());

    actions.view(&snapshot).await.unwrap();
    let diff = actions
        .diff(&snapshot, "# Notes\nsecond\n")
        .await
        .unwrap();
    assert_eq!(diff.added(), 1);
    assert_eq!(diff.deleted(), 1);

    actions.copy(&snapshot).await.unwrap();
    assert_eq!(
        host.clipboard.lock().unwrap().as_deref(),
        Some("# Notes\nfirst\n")
    );

    let shown = host.shown.lock().unwrap().clone();
    assert_eq!(shown.len(), 2);
    assert!(shown[0].0.starts_with("notes.md @ "));
    assert_eq!(shown[0].1, "# Notes\nfirst\n");
    assert!(shown[1].0.ends_with("↔ Current"));
}

#[tokio::test]
async fn test_missing_blob_is_reported() {
    let (orchestrator, _) = memory_orchestrator(HistoryConfig::default());
    let mut snapshot = saved(&orchestrator, "text").await;
    snapshot.id = "19990101-000000-000".to_string();

    let host = Arc::new(RecordingHost::default());
    let actions = HistoryActions::new(orchestrator, host.clone());
    assert!(actions.copy(&snapshot).await.is_err());
    assert_eq!(host.notifications()[0].0, NotifyLevel::Error);
    assert!(host.clipboard.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_plan_matches_prune() {
    let (orchestrator, clock) = memory_orchestrator(HistoryConfig {
        max_snapshots_per_file: 2,
        ..HistoryConfig::default()
    });
    for text in ["1", "2", "3", "4"] {
        orchestrator.on_save("a.md", text).await.unwrap();
        clock.advance(time::Duration::seconds(1));
    }

    let now = epoch_millis(clock.now());
    let plan = orchestrator.plan_prune(now).await.unwrap();
    assert_eq!(plan.snapshots.len(), 2);

    let PruneOutcome::Completed(report) = orchestrator.prune_at(now).await.unwrap() else {
        panic!("prune should run");
    };
    assert_eq!(report.snapshots_removed, plan.snapshots.len());
    assert_eq!(report.bytes_freed, plan.bytes());
}
