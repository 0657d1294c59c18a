//! Options, progress snapshots, and results for the migration engine.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Background migration tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationOptions {
    /// Records selected per batch.
    pub batch_size: usize,
    /// Pause between batches, in milliseconds.
    pub delay_between_batches_ms: u64,
    /// Runaway-loop guard: the run stops after this many batches.
    pub max_batches: u32,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            delay_between_batches_ms: 1000,
            max_batches: 1000,
        }
    }
}

impl MigrationOptions {
    pub fn delay_between_batches(&self) -> Duration {
        Duration::from_millis(self.delay_between_batches_ms)
    }
}

/// Point-in-time migration progress. Derived from counts; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MigrationStats {
    pub total: u64,
    pub v1_count: u64,
    pub v2_count: u64,
    /// Share of v2 records, rounded to two decimals. 100 for an empty store.
    pub percent_complete: f64,
}

impl MigrationStats {
    pub fn new(total: u64, v1_count: u64, v2_count: u64) -> Self {
        let percent_complete = if total == 0 {
            100.0
        } else {
            (v2_count as f64 / total as f64 * 10_000.0).round() / 100.0
        };
        Self {
            total,
            v1_count,
            v2_count,
            percent_complete,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.v1_count == 0
    }
}

/// Result of migrating a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    Migrated,
    AlreadyMigrated,
}

/// One record that failed to migrate. The record stays v1 and is picked up
/// again by a later batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRecordError {
    pub id: String,
    pub error: String,
}

/// Totals for one `migrate_batch` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchMigrationResult {
    pub migrated_count: u64,
    pub failed_count: u64,
    pub errors: Vec<MigrationRecordError>,
}

/// Why a background run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// No v1 records remain.
    Completed,
    /// A batch made no progress; the remaining records keep failing.
    Stalled,
    /// `max_batches` was reached with v1 records still remaining.
    MaxBatches,
    /// The caller requested cancellation.
    Cancelled,
}

/// Summary of a finished background run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackgroundMigrationReport {
    pub batches_run: u32,
    pub total_migrated: u64,
    pub total_failed: u64,
    pub stop_reason: StopReason,
    pub final_stats: MigrationStats,
}
