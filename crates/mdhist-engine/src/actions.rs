//! User-facing operations on a resolved snapshot: view, diff, restore, copy

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use mdhist_core::Snapshot;
use time::{OffsetDateTime, UtcOffset};
use tracing::info;

use crate::diff::{TextDiffResult, compute_text_diff};
use crate::orchestrator::HistoryOrchestrator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Error,
}

/// Presentation capabilities of whatever is hosting the history
#[async_trait]
pub trait EditorHost: Send + Sync {
    /// Ask the user to confirm a destructive action
    async fn confirm(&self, message: &str) -> bool;

    /// Open snapshot text read-only
    async fn show_snapshot(&self, title: &str, content: &str) -> Result<()>;

    async fn show_diff(&self, title: &str, diff: &TextDiffResult) -> Result<()>;

    /// Replace the whole document and save it. `Ok(false)` means the host
    /// rejected the edit.
    async fn replace_document(&self, file_path: &str, content: &str) -> Result<bool>;

    async fn write_clipboard(&self, text: &str) -> Result<()>;

    fn notify(&self, level: NotifyLevel, message: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Cancelled,
    Restored { pre_restore: Option<Snapshot> },
}

/// Snapshot time as `YYYY-MM-DD HH:MM:SS` in the local offset
pub fn display_time(snapshot: &Snapshot) -> String {
    let Some(utc) = snapshot.created_at() else {
        return snapshot.timestamp.to_string();
    };
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    format_local(utc.to_offset(offset))
}

fn format_local(at: OffsetDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        at.year(),
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute(),
        at.second()
    )
}

pub fn view_title(snapshot: &Snapshot) -> String {
    format!("{} @ {}", snapshot.file_path, display_time(snapshot))
}

pub fn diff_title(snapshot: &Snapshot) -> String {
    format!("{} ({}) ↔ Current", snapshot.file_path, display_time(snapshot))
}

pub struct HistoryActions {
    orchestrator: Arc<HistoryOrchestrator>,
    host: Arc<dyn EditorHost>,
}

impl HistoryActions {
    pub fn new(orchestrator: Arc<HistoryOrchestrator>, host: Arc<dyn EditorHost>) -> Self {
        Self { orchestrator, host }
    }

    /// Surface a failure to the user and hand it back to the caller
    fn report<T>(&self, result: Result<T>, context: &str) -> Result<T> {
        if let Err(e) = &result {
            self.host
                .notify(NotifyLevel::Error, &format!("{}: {:#}", context, e));
        }
        result
    }

    pub async fn view(&self, snapshot: &Snapshot) -> Result<()> {
        let result = self.view_inner(snapshot).await;
        self.report(result, "Failed to view snapshot")
    }

    async fn view_inner(&self, snapshot: &Snapshot) -> Result<()> {
        let content = self.orchestrator.read_content(snapshot).await?;
        self.host
            .show_snapshot(&view_title(snapshot), &content)
            .await
    }

    /// Compare a snapshot against the current document text
    pub async fn diff(&self, snapshot: &Snapshot, current: &str) -> Result<TextDiffResult> {
        let result = self.diff_inner(snapshot, current).await;
        self.report(result, "Failed to diff snapshot")
    }

    async fn diff_inner(&self, snapshot: &Snapshot, current: &str) -> Result<TextDiffResult> {
        let content = self.orchestrator.read_content(snapshot).await?;
        let diff = compute_text_diff(&content, current, &snapshot.file_path);
        self.host.show_diff(&diff_title(snapshot), &diff).await?;
        Ok(diff)
    }

    /// Replace the document with a snapshot after confirmation. Nothing is
    /// written when the user declines.
    pub async fn restore(&self, snapshot: &Snapshot, current: &str) -> Result<RestoreOutcome> {
        let message = format!(
            "Restore snapshot from {}? This will replace the current content.",
            display_time(snapshot)
        );
        if !self.host.confirm(&message).await {
            return Ok(RestoreOutcome::Cancelled);
        }

        let result = self.restore_inner(snapshot, current).await;
        let outcome = self.report(result, "Failed to restore snapshot")?;
        info!("Restored {} to snapshot {}", snapshot.file_path, snapshot.id);
        self.host
            .notify(NotifyLevel::Info, "Snapshot restored successfully");
        Ok(outcome)
    }

    async fn restore_inner(&self, snapshot: &Snapshot, current: &str) -> Result<RestoreOutcome> {
        let pre_restore = self
            .orchestrator
            .capture_pre_restore(&snapshot.file_path, current)
            .await;

        let content = self.orchestrator.read_content(snapshot).await?;
        if !self
            .host
            .replace_document(&snapshot.file_path, &content)
            .await?
        {
            anyhow::bail!("the edit was rejected");
        }
        Ok(RestoreOutcome::Restored { pre_restore })
    }

    pub async fn copy(&self, snapshot: &Snapshot) -> Result<()> {
        let result = self.copy_inner(snapshot).await;
        self.report(result, "Failed to copy snapshot")?;
        self.host
            .notify(NotifyLevel::Info, "Snapshot content copied to clipboard");
        Ok(())
    }

    async fn copy_inner(&self, snapshot: &Snapshot) -> Result<()> {
        let content = self.orchestrator.read_content(snapshot).await?;
        self.host.write_clipboard(&content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn snapshot(timestamp: i64) -> Snapshot {
        Snapshot {
            id: "20240501-100000-000".to_string(),
            file_path: "docs/notes.md".to_string(),
            timestamp,
            label: None,
            is_checkpoint: false,
            hash: String::new(),
            size_bytes: 0,
            compressed: false,
        }
    }

    #[test]
    fn test_format_local() {
        assert_eq!(
            format_local(datetime!(2024-05-01 09:05:03 +2)),
            "2024-05-01 09:05:03"
        );
    }

    #[test]
    fn test_titles() {
        let s = snapshot(1_714_557_600_000);
        let time = display_time(&s);
        assert_eq!(view_title(&s), format!("docs/notes.md @ {}", time));
        assert_eq!(diff_title(&s), format!("docs/notes.md ({}) ↔ Current", time));
    }
}
