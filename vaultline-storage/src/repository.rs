//! Query/command surface the core consumes from the persistence layer.
//!
//! Every method is a suspension point. Implementations must be safe to share
//! across tasks (`Arc<dyn VaultRepository>`).

use crate::error::StorageResult;
use crate::records::{AuditLogEntry, AuditQuery, VaultQuery, VaultRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use vaultline_crypto::EncryptedPayload;

/// Vault record persistence.
#[async_trait]
pub trait VaultRepository: Send + Sync {
    /// Finds a record by id.
    async fn find_vault_record(&self, id: &str) -> StorageResult<Option<VaultRecord>>;

    /// Finds records matching `query`, oldest first.
    async fn find_vault_records(&self, query: &VaultQuery) -> StorageResult<Vec<VaultRecord>>;

    /// Inserts a new record. Fails if the id already exists.
    async fn create_vault_record(&self, record: &VaultRecord) -> StorageResult<()>;

    /// Replaces the encryption fields of an existing record in place.
    /// Identity and metadata are left untouched.
    async fn update_vault_payload(
        &self,
        id: &str,
        payload: &EncryptedPayload,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Counts records matching `query` (`limit` is ignored).
    async fn count_vault_records(&self, query: &VaultQuery) -> StorageResult<u64>;
}

/// Append-only audit log persistence. Entries are never updated.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Returns the newest entry for a user (the chain tip).
    async fn latest_audit_entry(&self, user_id: &str) -> StorageResult<Option<AuditLogEntry>>;

    /// Finds entries matching `query`, oldest first.
    async fn find_audit_entries(&self, query: &AuditQuery) -> StorageResult<Vec<AuditLogEntry>>;

    /// Appends an entry. Fails if the id already exists.
    async fn create_audit_entry(&self, entry: &AuditLogEntry) -> StorageResult<()>;

    /// Counts entries matching `query` (`limit` is ignored).
    async fn count_audit_entries(&self, query: &AuditQuery) -> StorageResult<u64>;

    /// Retention: deletes every entry older than `cutoff`. Returns the count removed.
    async fn delete_audit_entries_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64>;
}
