//! Debounced interval snapshots
//!
//! Each edit to a document restarts that document's timer. When a timer
//! runs out the document's current text is fetched and handed to the
//! orchestrator's interval trigger.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::orchestrator::HistoryOrchestrator;

/// Read access to the documents a host has open
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Current text of a document, `None` when it is no longer available
    async fn current_text(&self, file_path: &str) -> Option<String>;
}

struct PendingTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

struct SchedulerState {
    orchestrator: Arc<HistoryOrchestrator>,
    source: Arc<dyn DocumentSource>,
    delay: Duration,
    timers: DashMap<String, PendingTimer>,
    generation: AtomicU64,
}

impl SchedulerState {
    async fn fire(&self, file_path: &str, generation: u64) {
        // Unregister first: once removed, a reschedule or close can no
        // longer abort this task halfway through a write.
        let current = self
            .timers
            .remove_if(file_path, |_, timer| timer.generation == generation)
            .is_some();
        if !current {
            return;
        }

        match self.source.current_text(file_path).await {
            Some(text) => {
                self.orchestrator.on_interval(file_path, &text).await;
            }
            None => debug!("{} is gone, skipping interval snapshot", file_path),
        }
    }
}

pub struct IntervalScheduler {
    state: Arc<SchedulerState>,
}

impl IntervalScheduler {
    /// Uses the configured interval of `orchestrator`
    pub fn new(orchestrator: Arc<HistoryOrchestrator>, source: Arc<dyn DocumentSource>) -> Self {
        let delay = orchestrator.config().interval();
        Self {
            state: Arc::new(SchedulerState {
                orchestrator,
                source,
                delay,
                timers: DashMap::new(),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn delay(&self) -> Duration {
        self.state.delay
    }

    /// A document's content changed. Must be called from within a tokio runtime.
    pub fn on_change(&self, file_path: &str) {
        if !self.state.orchestrator.accepts_interval(file_path) {
            return;
        }

        let generation = self.state.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let state = Arc::clone(&self.state);
        let key = file_path.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(state.delay).await;
            state.fire(&key, generation).await;
        });

        let previous = self
            .state
            .timers
            .insert(file_path.to_string(), PendingTimer { generation, handle });
        if let Some(previous) = previous {
            previous.handle.abort();
        }
    }

    /// Cancel the document's pending timer, if any
    pub fn on_close(&self, file_path: &str) {
        if let Some((_, timer)) = self.state.timers.remove(file_path) {
            timer.handle.abort();
            debug!("Cancelled interval timer for {}", file_path);
        }
    }

    /// Number of documents with a pending timer
    pub fn pending(&self) -> usize {
        self.state.timers.len()
    }

    pub fn shutdown(&self) {
        self.state.timers.retain(|_, timer| {
            timer.handle.abort();
            false
        });
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
