//! Migration orchestrator.
//!
//! Upgrades vault records from the legacy single-layer scheme (v1) to
//! envelope encryption (v2) in place, one record at a time:
//! - `migrate_entry`: idempotent single-record upgrade plus audit entry,
//!   serialized per record so overlapping runs migrate and audit it once
//! - `migrate_batch`: isolates per-record failures, aborts on fatal ones
//! - `schedule_background_migration`: batch loop with stall, runaway, and
//!   cancellation guards
//!
//! A record is only ever rewritten with a complete v2 payload, so stopping
//! between batches never leaves partial state.

use crate::error::{MigrationError, MigrationResult};
use crate::types::{
    BackgroundMigrationReport, BatchMigrationResult, MigrationOptions, MigrationOutcome,
    MigrationRecordError, MigrationStats, StopReason,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vaultline_audit::{AuditLedger, KeyedLocks, NewAuditEntry};
use vaultline_crypto::{EncryptedPayload, EncryptionVersion, KeyManager};
use vaultline_storage::{ActorType, AuditEventType, VaultQuery, VaultRepository};

/// Actor id recorded on audit entries written by the engine.
pub const MIGRATION_ACTOR_ID: &str = "system:encryption-migration";

/// Runs v1 to v2 migrations against a vault repository.
#[derive(Clone)]
pub struct MigrationEngine {
    keys: Arc<KeyManager>,
    vault: Arc<dyn VaultRepository>,
    ledger: Arc<AuditLedger>,
    record_locks: Arc<KeyedLocks>,
}

/// Handle for stopping a spawned background migration.
#[derive(Clone)]
pub struct MigrationHandle {
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl MigrationHandle {
    /// Requests a stop. The run finishes its current batch first.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }
}

impl MigrationEngine {
    pub fn new(
        keys: Arc<KeyManager>,
        vault: Arc<dyn VaultRepository>,
        ledger: Arc<AuditLedger>,
    ) -> Self {
        Self {
            keys,
            vault,
            ledger,
            record_locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Current v1/v2 split across all records.
    pub async fn get_stats(&self) -> MigrationResult<MigrationStats> {
        let total = self.vault.count_vault_records(&VaultQuery::all()).await?;
        let v1_count = self
            .vault
            .count_vault_records(&VaultQuery::all().with_version(EncryptionVersion::V1))
            .await?;
        let v2_count = self
            .vault
            .count_vault_records(&VaultQuery::all().with_version(EncryptionVersion::V2))
            .await?;
        Ok(MigrationStats::new(total, v1_count, v2_count))
    }

    /// Upgrades one record. A record that is already v2 is left untouched.
    ///
    /// The read, rewrite and audit append run under a per-record lock shared
    /// by every clone of this engine.
    pub async fn migrate_entry(&self, id: &str) -> MigrationResult<MigrationOutcome> {
        let _guard = self.record_locks.lock(id).await;
        let record = self
            .vault
            .find_vault_record(id)
            .await?
            .ok_or_else(|| MigrationError::NotFound(id.to_string()))?;

        let legacy = match &record.payload {
            EncryptedPayload::Envelope(_) => {
                debug!("record {id} already uses envelope encryption");
                return Ok(MigrationOutcome::AlreadyMigrated);
            }
            EncryptedPayload::Legacy(legacy) => legacy,
        };

        let envelope = self.keys.migrate_to_envelope_encryption(legacy)?;
        self.vault
            .update_vault_payload(id, &EncryptedPayload::Envelope(envelope), Utc::now())
            .await?;

        self.ledger
            .append_entry(
                NewAuditEntry::new(
                    record.user_id,
                    AuditEventType::EncryptionMigrated,
                    "migrated vault data from v1 to v2 encryption",
                    MIGRATION_ACTOR_ID,
                    ActorType::System,
                )
                .with_vault_data(id),
            )
            .await?;

        debug!("migrated record {id} to envelope encryption");
        Ok(MigrationOutcome::Migrated)
    }

    /// Migrates up to `batch_size` of the oldest v1 records.
    ///
    /// Record-level failures are collected and the batch continues. Fatal
    /// errors abort the batch and are returned.
    pub async fn migrate_batch(&self, batch_size: usize) -> MigrationResult<BatchMigrationResult> {
        let mut result = BatchMigrationResult::default();
        if batch_size == 0 {
            return Ok(result);
        }

        let query = VaultQuery::all()
            .with_version(EncryptionVersion::V1)
            .with_limit(batch_size);
        let candidates = self.vault.find_vault_records(&query).await?;

        for record in candidates {
            match self.migrate_entry(&record.id).await {
                Ok(MigrationOutcome::Migrated) => result.migrated_count += 1,
                Ok(MigrationOutcome::AlreadyMigrated) => {}
                Err(e) if e.is_fatal() => {
                    error!("migration batch aborted at record {}: {e}", record.id);
                    return Err(e);
                }
                Err(e) => {
                    warn!("failed to migrate record {}: {e}", record.id);
                    result.errors.push(MigrationRecordError {
                        id: record.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        result.failed_count = result.errors.len() as u64;
        Ok(result)
    }

    /// Runs batches until no v1 records remain or a guard trips.
    ///
    /// `cancel` is checked before each batch and interrupts the pause between
    /// batches. A closed cancel channel means the run can no longer be
    /// cancelled, not that it should stop.
    pub async fn schedule_background_migration(
        &self,
        options: &MigrationOptions,
        mut cancel: watch::Receiver<bool>,
    ) -> MigrationResult<BackgroundMigrationReport> {
        info!(
            batch_size = options.batch_size,
            max_batches = options.max_batches,
            "background encryption migration started"
        );

        let mut batches_run = 0u32;
        let mut total_migrated = 0u64;
        let mut total_failed = 0u64;

        let stop_reason = loop {
            let cancelled = *cancel.borrow_and_update();
            if cancelled {
                info!("background migration cancelled after {batches_run} batches");
                break StopReason::Cancelled;
            }

            let stats = self.get_stats().await?;
            if stats.is_complete() {
                break StopReason::Completed;
            }
            if batches_run >= options.max_batches {
                warn!(
                    remaining = stats.v1_count,
                    "background migration hit max_batches ({}) before finishing",
                    options.max_batches
                );
                break StopReason::MaxBatches;
            }

            let batch = self.migrate_batch(options.batch_size).await?;
            batches_run += 1;
            total_migrated += batch.migrated_count;
            total_failed += batch.failed_count;
            info!(
                batch = batches_run,
                migrated = batch.migrated_count,
                failed = batch.failed_count,
                remaining = stats.v1_count.saturating_sub(batch.migrated_count),
                "migration batch finished"
            );

            if batch.migrated_count == 0 {
                warn!(
                    remaining = stats.v1_count,
                    "migration stalled: batch made no progress"
                );
                break StopReason::Stalled;
            }

            tokio::select! {
                _ = tokio::time::sleep(options.delay_between_batches()) => {}
                Ok(()) = cancel.changed() => {}
            }
        };

        let final_stats = self.get_stats().await?;
        info!(
            ?stop_reason,
            total_migrated,
            total_failed,
            percent_complete = final_stats.percent_complete,
            "background encryption migration finished"
        );

        Ok(BackgroundMigrationReport {
            batches_run,
            total_migrated,
            total_failed,
            stop_reason,
            final_stats,
        })
    }

    /// Spawns `schedule_background_migration` on the current runtime.
    pub fn spawn_background_migration(
        &self,
        options: MigrationOptions,
    ) -> (
        MigrationHandle,
        JoinHandle<MigrationResult<BackgroundMigrationReport>>,
    ) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = MigrationHandle {
            cancel_tx: Arc::new(cancel_tx),
        };

        let engine = self.clone();
        let task = tokio::spawn(async move {
            engine
                .schedule_background_migration(&options, cancel_rx)
                .await
        });

        (handle, task)
    }
}
