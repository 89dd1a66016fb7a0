//! Retention engine
//!
//! Three independent filters (age, per-file count, global size) each
//! propose snapshots for deletion; the result is their union, oldest first.
//! Protected checkpoints are never proposed, even when that leaves a file
//! over its count cap or the root over its size budget.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::snapshot::Snapshot;

pub const MS_PER_DAY: i64 = 86_400_000;
pub const BYTES_PER_MB: u64 = 1_048_576;

/// Limits governing snapshot eviction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    pub max_snapshots_per_file: usize,
    /// Budget shared by every file under one history root
    pub max_total_storage_mb: u64,
    pub retention_days: u64,
    pub protect_manual_checkpoints: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_snapshots_per_file: 100,
            max_total_storage_mb: 200,
            retention_days: 30,
            protect_manual_checkpoints: true,
        }
    }
}

impl RetentionPolicy {
    pub fn max_total_bytes(&self) -> u64 {
        self.max_total_storage_mb.saturating_mul(BYTES_PER_MB)
    }

    /// Snapshots strictly older than this epoch-ms instant are expired
    pub fn age_cutoff(&self, now_ms: i64) -> i64 {
        let days = i64::try_from(self.retention_days).unwrap_or(i64::MAX);
        now_ms.saturating_sub(days.saturating_mul(MS_PER_DAY))
    }

    fn is_protected(&self, snapshot: &Snapshot) -> bool {
        self.protect_manual_checkpoints && snapshot.is_checkpoint
    }
}

/// Compute the snapshots eligible for deletion, sorted by timestamp ascending.
///
/// Pure and deterministic for a given `now_ms`.
pub fn snapshots_to_delete(
    snapshots: &[Snapshot],
    policy: &RetentionPolicy,
    now_ms: i64,
) -> Vec<Snapshot> {
    if snapshots.is_empty() {
        return Vec::new();
    }

    // Positions into `snapshots`; a snapshot flagged by several filters
    // appears once.
    let mut selected: BTreeSet<usize> = BTreeSet::new();
    selected.extend(filter_by_age(snapshots, policy, now_ms));
    selected.extend(filter_by_count(snapshots, policy));
    selected.extend(filter_by_size(snapshots, policy));

    let mut result: Vec<usize> = selected.into_iter().collect();
    result.sort_by_key(|&i| snapshots[i].timestamp);
    result.into_iter().map(|i| snapshots[i].clone()).collect()
}

/// Positions sorted by timestamp ascending; ties keep input order
fn chronological(snapshots: &[Snapshot], positions: impl Iterator<Item = usize>) -> Vec<usize> {
    let mut sorted: Vec<usize> = positions.collect();
    sorted.sort_by_key(|&i| snapshots[i].timestamp);
    sorted
}

fn filter_by_age(snapshots: &[Snapshot], policy: &RetentionPolicy, now_ms: i64) -> Vec<usize> {
    let cutoff = policy.age_cutoff(now_ms);
    snapshots
        .iter()
        .enumerate()
        .filter(|(_, s)| s.timestamp < cutoff && !policy.is_protected(s))
        .map(|(i, _)| i)
        .collect()
}

fn filter_by_count(snapshots: &[Snapshot], policy: &RetentionPolicy) -> Vec<usize> {
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, s) in snapshots.iter().enumerate() {
        groups.entry(s.file_path.as_str()).or_default().push(i);
    }

    let mut to_delete = Vec::new();
    for positions in groups.into_values() {
        if positions.len() <= policy.max_snapshots_per_file {
            continue;
        }
        let excess = positions.len() - policy.max_snapshots_per_file;
        let sorted = chronological(snapshots, positions.into_iter());
        to_delete.extend(
            sorted
                .into_iter()
                .filter(|&i| !policy.is_protected(&snapshots[i]))
                .take(excess),
        );
    }
    to_delete
}

fn filter_by_size(snapshots: &[Snapshot], policy: &RetentionPolicy) -> Vec<usize> {
    let budget = policy.max_total_bytes();
    let mut total: u64 = snapshots.iter().map(|s| s.size_bytes).sum();
    if total <= budget {
        return Vec::new();
    }

    let mut to_delete = Vec::new();
    for i in chronological(snapshots, 0..snapshots.len()) {
        if total <= budget {
            break;
        }
        if policy.is_protected(&snapshots[i]) {
            continue;
        }
        to_delete.push(i);
        total = total.saturating_sub(snapshots[i].size_bytes);
    }
    to_delete
}
