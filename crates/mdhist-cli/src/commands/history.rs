use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use mdhist_config::{Config, HistoryMode};
use mdhist_core::{Clock, Snapshot, SystemClock, compute_hash, epoch_millis};
use mdhist_engine::{
    DocumentSource, HistoryActions, HistoryOrchestrator, IntervalScheduler, PruneOutcome,
    RestoreOutcome, display_time,
};
use mdhist_storage::FsIo;

use super::logical_path;
use crate::cli::Commands;
use crate::host::TerminalHost;

pub async fn handle(cmd: Commands, workspace: &Path, config: &Config) -> Result<()> {
    let root = config.history.history_root(workspace)?;
    let orchestrator = Arc::new(HistoryOrchestrator::new(
        root,
        Arc::new(FsIo::new()),
        config.history.clone(),
    ));

    match cmd {
        Commands::Save { file } => save(&orchestrator, workspace, &file).await,
        Commands::Checkpoint { file, label } => {
            checkpoint(&orchestrator, workspace, &file, &label).await
        }
        Commands::List { file } => list(&orchestrator, workspace, &file).await,
        Commands::View { file, id } => {
            let snapshot = resolve(&orchestrator, workspace, &file, &id).await?;
            actions(&orchestrator, workspace, false).view(&snapshot).await
        }
        Commands::Diff { file, id } => {
            let snapshot = resolve(&orchestrator, workspace, &file, &id).await?;
            let current = read_current(&file).await?;
            actions(&orchestrator, workspace, false)
                .diff(&snapshot, &current)
                .await?;
            Ok(())
        }
        Commands::Copy { file, id } => {
            let snapshot = resolve(&orchestrator, workspace, &file, &id).await?;
            actions(&orchestrator, workspace, false).copy(&snapshot).await
        }
        Commands::Restore { file, id, yes } => {
            restore(&orchestrator, workspace, &file, &id, yes).await
        }
        Commands::Prune { dry_run } => prune(&orchestrator, dry_run).await,
        Commands::Watch { files, poll_ms } => watch(orchestrator, workspace, files, poll_ms).await,
    }
}

fn actions(
    orchestrator: &Arc<HistoryOrchestrator>,
    workspace: &Path,
    assume_yes: bool,
) -> HistoryActions {
    HistoryActions::new(
        Arc::clone(orchestrator),
        Arc::new(TerminalHost::new(workspace, assume_yes)),
    )
}

async fn read_current(file: &Path) -> Result<String> {
    tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))
}

async fn resolve(
    orchestrator: &HistoryOrchestrator,
    workspace: &Path,
    file: &Path,
    id: &str,
) -> Result<Snapshot> {
    let logical = logical_path(workspace, file)?;
    orchestrator
        .find(&logical, id)
        .await?
        .with_context(|| format!("Snapshot {} not found for {}", id, logical))
}

async fn save(orchestrator: &HistoryOrchestrator, workspace: &Path, file: &Path) -> Result<()> {
    let logical = logical_path(workspace, file)?;
    let content = read_current(file).await?;

    if !orchestrator.accepts_save(&logical) {
        println!(
            "Skipped: history is disabled, not in onSave mode, or {} is not a Markdown file.",
            logical
        );
        return Ok(());
    }

    match orchestrator.on_save(&logical, &content).await {
        Some(snapshot) => println!("✓ Created snapshot {} for {}", snapshot.id, logical),
        None => println!("No changes since the last snapshot."),
    }
    Ok(())
}

async fn checkpoint(
    orchestrator: &HistoryOrchestrator,
    workspace: &Path,
    file: &Path,
    label: &str,
) -> Result<()> {
    let logical = logical_path(workspace, file)?;
    let content = read_current(file).await?;

    let snapshot = orchestrator
        .checkpoint(&logical, &content, label)
        .await
        .context("Failed to create checkpoint")?;

    println!(
        "✓ Checkpoint created: {}",
        snapshot.label.as_deref().unwrap_or_default()
    );
    println!("  ID: {}", snapshot.id);
    Ok(())
}

async fn list(orchestrator: &HistoryOrchestrator, workspace: &Path, file: &Path) -> Result<()> {
    let logical = logical_path(workspace, file)?;
    let snapshots = orchestrator.list(&logical).await?;

    if snapshots.is_empty() {
        println!("No snapshots found.");
        return Ok(());
    }

    println!("Snapshots of {} ({}):", logical, snapshots.len());
    for snapshot in snapshots {
        let marker = if snapshot.is_checkpoint { "★" } else { " " };
        let label = snapshot.label.as_deref().unwrap_or("");
        println!(
            "  {} {}  {}  {:>9}  {:<4}  {}",
            marker,
            snapshot.id,
            display_time(&snapshot),
            format_size(snapshot.size_bytes),
            if snapshot.compressed { "gzip" } else { "raw" },
            label
        );
    }
    Ok(())
}

async fn restore(
    orchestrator: &Arc<HistoryOrchestrator>,
    workspace: &Path,
    file: &Path,
    id: &str,
    yes: bool,
) -> Result<()> {
    let snapshot = resolve(orchestrator, workspace, file, id).await?;
    let current = read_current(file).await?;

    match actions(orchestrator, workspace, yes)
        .restore(&snapshot, &current)
        .await?
    {
        RestoreOutcome::Cancelled => println!("Cancelled."),
        RestoreOutcome::Restored { pre_restore } => {
            if let Some(pre_restore) = pre_restore {
                println!("  Previous content saved as {}", pre_restore.id);
            }
        }
    }
    Ok(())
}

async fn prune(orchestrator: &HistoryOrchestrator, dry_run: bool) -> Result<()> {
    if dry_run {
        let plan = orchestrator
            .plan_prune(epoch_millis(SystemClock.now()))
            .await?;
        if plan.snapshots.is_empty() {
            println!("No snapshots need to be pruned ({} examined).", plan.examined);
            return Ok(());
        }
        println!(
            "Would prune {} of {} snapshot(s), freeing {}:",
            plan.snapshots.len(),
            plan.examined,
            format_size(plan.bytes())
        );
        for snapshot in &plan.snapshots {
            println!("  {}  {}", snapshot.file_path, snapshot.id);
        }
        return Ok(());
    }

    match orchestrator.prune().await.context("Failed to prune snapshots")? {
        PruneOutcome::AlreadyRunning => println!("A prune is already running."),
        PruneOutcome::Completed(report) if report.examined == 0 => println!("No history found."),
        PruneOutcome::Completed(report) if report.snapshots_removed == 0 => {
            println!("No snapshots need to be pruned.")
        }
        PruneOutcome::Completed(report) => {
            println!(
                "✓ Pruned {} snapshot(s) from {} index file(s)",
                report.snapshots_removed, report.indexes_updated
            );
            println!("  Freed: {}", format_size(report.bytes_freed));
        }
    }
    Ok(())
}

async fn watch(
    orchestrator: Arc<HistoryOrchestrator>,
    workspace: &Path,
    files: Vec<PathBuf>,
    poll_ms: u64,
) -> Result<()> {
    let host = Arc::new(TerminalHost::new(workspace, false));
    let scheduler = IntervalScheduler::new(Arc::clone(&orchestrator), host.clone());
    let mode = orchestrator.config().mode;

    // Logical path -> hash of the last text seen, `None` while unreadable
    let mut watched: BTreeMap<String, Option<String>> = BTreeMap::new();
    for file in &files {
        let logical = logical_path(workspace, file)?;
        let hash = host.current_text(&logical).await.map(|t| compute_hash(&t));
        watched.insert(logical, hash);
    }

    match mode {
        HistoryMode::OnSave => {
            println!("Watching {} file(s), snapshot on every save.", watched.len())
        }
        HistoryMode::Interval => println!(
            "Watching {} file(s), snapshot after {}s without edits.",
            watched.len(),
            scheduler.delay().as_secs()
        ),
    }
    println!("Press Ctrl-C to stop.");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(Duration::from_millis(poll_ms.max(50)));

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = ticker.tick() => {
                for (logical, last_hash) in watched.iter_mut() {
                    let Some(text) = host.current_text(logical).await else {
                        if last_hash.take().is_some() {
                            scheduler.on_close(logical);
                        }
                        continue;
                    };

                    let hash = compute_hash(&text);
                    if last_hash.as_deref() == Some(hash.as_str()) {
                        continue;
                    }
                    *last_hash = Some(hash);

                    match mode {
                        HistoryMode::OnSave => {
                            if let Some(snapshot) = orchestrator.on_save(logical, &text).await {
                                println!("✓ Created snapshot {} for {}", snapshot.id, logical);
                            }
                        }
                        HistoryMode::Interval => scheduler.on_change(logical),
                    }
                }
            }
        }
    }

    let pending = scheduler.pending();
    scheduler.shutdown();
    if pending > 0 {
        println!("Cancelled {} pending snapshot timer(s).", pending);
    }
    println!("Stopped.");
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let bytes_f = bytes as f64;
    if bytes_f < KB {
        format!("{} B", bytes)
    } else if bytes_f < KB * KB {
        format!("{:.1} KB", bytes_f / KB)
    } else {
        format!("{:.1} MB", bytes_f / (KB * KB))
    }
}
