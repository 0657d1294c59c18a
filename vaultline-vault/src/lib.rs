//! Business-logic facade for the Vaultline core.
//!
//! `VaultService` is what the surrounding application calls: it encrypts new
//! records under the envelope scheme, decrypts by version, records audit
//! events, and exposes the admin migration operations.
//!
//! Key material never leaves the service. Plaintext only exists for the
//! duration of a single call.

pub mod config;
pub mod telemetry;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;
use vaultline_audit::AuditLedger;
use vaultline_crypto::{CryptoError, EncryptionVersion, KeyManager};
use vaultline_migration::MigrationEngine;
use vaultline_storage::{AuditRepository, VaultQuery, VaultRecord, VaultRepository};

pub use config::VaultConfig;
pub use vaultline_audit::{AuditError, ChainVerification, NewAuditEntry};
pub use vaultline_crypto::KeyConfig;
pub use vaultline_migration::{
    BackgroundMigrationReport, BatchMigrationResult, MigrationError, MigrationHandle,
    MigrationOptions, MigrationOutcome, MigrationStats, StopReason,
};
pub use vaultline_storage::{ActorType, AuditEventType, AuditLogEntry, StorageError};

// ============================================================================
// Error types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("vault data not found: {0}")]
    NotFound(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("audit error: {0}")]
    Audit(#[from] AuditError),
    #[error("migration error: {0}")]
    Migration(#[from] MigrationError),
}

pub type VaultResult<T> = Result<T, VaultError>;

// ============================================================================
// Records exposed to callers
// ============================================================================

/// Plaintext submitted for storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVaultData {
    pub category: String,
    pub label: Option<String>,
    pub data: Vec<u8>,
}

impl NewVaultData {
    pub fn new(category: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            category: category.into(),
            label: None,
            data: data.into(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Decryption result for one record in a bulk read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadState {
    Available(Vec<u8>),
    /// The payload could not be decrypted; metadata is still returned.
    Unavailable { reason: String },
}

impl PayloadState {
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            PayloadState::Available(data) => Some(data),
            PayloadState::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, PayloadState::Available(_))
    }
}

/// A vault record with its payload decrypted (or marked unavailable).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultItem {
    pub id: String,
    pub user_id: String,
    pub category: String,
    pub label: Option<String>,
    pub version: EncryptionVersion,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub payload: PayloadState,
}

impl VaultItem {
    fn from_record(record: VaultRecord, payload: PayloadState) -> Self {
        Self {
            version: record.version(),
            id: record.id,
            user_id: record.user_id,
            category: record.category,
            label: record.label,
            created_at: record.created_at,
            updated_at: record.updated_at,
            payload,
        }
    }
}

// ============================================================================
// VaultService
// ============================================================================

/// Entry point for the business-logic layer.
pub struct VaultService {
    keys: Arc<KeyManager>,
    vault: Arc<dyn VaultRepository>,
    ledger: Arc<AuditLedger>,
    migration: MigrationEngine,
    config: VaultConfig,
}

impl VaultService {
    /// Builds the service over a store that implements both repositories.
    ///
    /// Fails if the master key is missing, malformed, or fails its self-check.
    pub fn new<S>(config: VaultConfig, store: Arc<S>) -> VaultResult<Self>
    where
        S: VaultRepository + AuditRepository + 'static,
    {
        let audit: Arc<dyn AuditRepository> = store.clone();
        Self::with_repositories(config, store, audit)
    }

    pub fn with_repositories(
        config: VaultConfig,
        vault: Arc<dyn VaultRepository>,
        audit: Arc<dyn AuditRepository>,
    ) -> VaultResult<Self> {
        let keys = Arc::new(KeyManager::new(&config.keys)?);
        if !keys.verify_kek() {
            return Err(
                CryptoError::Configuration("master key failed its self-check".into()).into(),
            );
        }

        let ledger = Arc::new(AuditLedger::new(audit));
        let migration = MigrationEngine::new(keys.clone(), vault.clone(), ledger.clone());
        info!("vault service ready");

        Ok(Self {
            keys,
            vault,
            ledger,
            migration,
            config,
        })
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Liveness check for the master key that touches no stored data.
    pub fn verify_master_key(&self) -> bool {
        self.keys.verify_kek()
    }

    // ── Vault data ──

    /// Envelope-encrypts and stores new data, then records `DATA_CREATED`.
    pub async fn create_vault_data(
        &self,
        user_id: &str,
        new: NewVaultData,
    ) -> VaultResult<VaultRecord> {
        let payload = self.keys.envelope_encrypt(&new.data)?;
        let now = Utc::now();
        let record = VaultRecord {
            id: Uuid::now_v7().to_string(),
            user_id: user_id.to_string(),
            category: new.category,
            label: new.label,
            payload: payload.into(),
            created_at: now,
            updated_at: now,
        };
        self.vault.create_vault_record(&record).await?;

        self.ledger
            .append_entry(
                NewAuditEntry::new(
                    user_id,
                    AuditEventType::DataCreated,
                    format!("created {} vault data", record.category),
                    user_id,
                    ActorType::User,
                )
                .with_vault_data(record.id.clone()),
            )
            .await?;

        Ok(record)
    }

    /// Every record a user owns, oldest first.
    ///
    /// A record that fails to decrypt is returned with
    /// `PayloadState::Unavailable` instead of failing the whole read.
    pub async fn get_user_vault_data(&self, user_id: &str) -> VaultResult<Vec<VaultItem>> {
        let records = self
            .vault
            .find_vault_records(&VaultQuery::for_user(user_id))
            .await?;

        let items = records
            .into_iter()
            .map(|record| {
                let payload = match self.keys.decrypt_payload(&record.payload) {
                    Ok(data) => PayloadState::Available(data),
                    Err(e) => {
                        warn!(
                            user_id,
                            version = %record.version(),
                            "vault record {} is unreadable: {e}",
                            record.id
                        );
                        PayloadState::Unavailable {
                            reason: e.to_string(),
                        }
                    }
                };
                VaultItem::from_record(record, payload)
            })
            .collect();

        Ok(items)
    }

    /// One record, decrypted. Decryption failures are returned as errors.
    pub async fn get_vault_data(&self, id: &str) -> VaultResult<VaultItem> {
        let record = self
            .vault
            .find_vault_record(id)
            .await?
            .ok_or_else(|| VaultError::NotFound(id.to_string()))?;
        let data = self.keys.decrypt_payload(&record.payload)?;
        Ok(VaultItem::from_record(record, PayloadState::Available(data)))
    }

    // ── Audit trail ──

    pub async fn append_audit_entry(&self, entry: NewAuditEntry) -> VaultResult<AuditLogEntry> {
        Ok(self.ledger.append_entry(entry).await?)
    }

    /// Verifies a user's stored chain. A broken chain is reported in the
    /// result and logged as a tamper warning, not returned as an error.
    pub async fn verify_audit_chain(&self, user_id: &str) -> VaultResult<ChainVerification> {
        Ok(self.ledger.verify_user_chain(user_id).await?)
    }

    pub async fn audit_trail(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> VaultResult<Vec<AuditLogEntry>> {
        Ok(self.ledger.entries_for_user(user_id, since, until).await?)
    }

    /// Applies the configured retention window. Returns the number of entries
    /// removed; zero when no retention is configured.
    pub async fn purge_expired_audit_entries(&self) -> VaultResult<u64> {
        match self.config.audit_retention() {
            Some(retention) => Ok(self.ledger.purge_before(Utc::now() - retention).await?),
            None => Ok(0),
        }
    }

    // ── Migration (admin) ──

    pub async fn migration_stats(&self) -> VaultResult<MigrationStats> {
        Ok(self.migration.get_stats().await?)
    }

    pub async fn migrate_batch(&self, batch_size: usize) -> VaultResult<BatchMigrationResult> {
        Ok(self.migration.migrate_batch(batch_size).await?)
    }

    /// Runs the background loop to completion on the calling task.
    pub async fn schedule_background_migration(
        &self,
        options: &MigrationOptions,
        cancel: watch::Receiver<bool>,
    ) -> VaultResult<BackgroundMigrationReport> {
        Ok(self
            .migration
            .schedule_background_migration(options, cancel)
            .await?)
    }

    /// Spawns the background loop with the configured options.
    pub fn spawn_background_migration(
        &self,
    ) -> (
        MigrationHandle,
        JoinHandle<Result<BackgroundMigrationReport, MigrationError>>,
    ) {
        self.migration
            .spawn_background_migration(self.config.migration.clone())
    }
}
