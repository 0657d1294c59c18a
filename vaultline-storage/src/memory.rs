//! In-process store for tests and single-node deployments without a database.

use crate::error::{StorageError, StorageResult};
use crate::records::{AuditLogEntry, AuditQuery, VaultQuery, VaultRecord};
use crate::repository::{AuditRepository, VaultRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use vaultline_crypto::EncryptedPayload;

/// Thread-safe in-memory implementation of both repositories.
///
/// Clones share the same underlying data. `set_available(false)` makes every
/// call fail with `StorageError::Unavailable`, simulating an outage.
#[derive(Clone, Default)]
pub struct MemoryStore {
    vault: Arc<RwLock<HashMap<String, VaultRecord>>>,
    audit: Arc<RwLock<Vec<AuditLogEntry>>>,
    offline: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggles the simulated outage.
    pub fn set_available(&self, available: bool) {
        self.offline.store(!available, Ordering::SeqCst);
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory store offline".into()));
        }
        Ok(())
    }
}

fn sorted_vault(mut records: Vec<VaultRecord>) -> Vec<VaultRecord> {
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    records
}

#[async_trait]
impl VaultRepository for MemoryStore {
    async fn find_vault_record(&self, id: &str) -> StorageResult<Option<VaultRecord>> {
        self.check_available()?;
        Ok(self.vault.read().await.get(id).cloned())
    }

    async fn find_vault_records(&self, query: &VaultQuery) -> StorageResult<Vec<VaultRecord>> {
        self.check_available()?;
        let matching = self
            .vault
            .read()
            .await
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        let mut records = sorted_vault(matching);
        if let Some(limit) = query.limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn create_vault_record(&self, record: &VaultRecord) -> StorageResult<()> {
        self.check_available()?;
        let mut vault = self.vault.write().await;
        if vault.contains_key(&record.id) {
            return Err(StorageError::Duplicate(record.id.clone()));
        }
        vault.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update_vault_payload(
        &self,
        id: &str,
        payload: &EncryptedPayload,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.check_available()?;
        let mut vault = self.vault.write().await;
        let record = vault
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        record.payload = payload.clone();
        record.updated_at = updated_at;
        Ok(())
    }

    async fn count_vault_records(&self, query: &VaultQuery) -> StorageResult<u64> {
        self.check_available()?;
        let count = self.vault.read().await.values().filter(|r| query.matches(r)).count();
        Ok(count as u64)
    }
}

#[async_trait]
impl AuditRepository for MemoryStore {
    async fn latest_audit_entry(&self, user_id: &str) -> StorageResult<Option<AuditLogEntry>> {
        self.check_available()?;
        Ok(self
            .audit
            .read()
            .await
            .iter()
            .filter(|e| e.user_id == user_id)
            .max_by_key(|e| e.timestamp)
            .cloned())
    }

    async fn find_audit_entries(&self, query: &AuditQuery) -> StorageResult<Vec<AuditLogEntry>> {
        self.check_available()?;
        let mut entries: Vec<AuditLogEntry> = self
            .audit
            .read()
            .await
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.timestamp);
        if let Some(limit) = query.limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    async fn create_audit_entry(&self, entry: &AuditLogEntry) -> StorageResult<()> {
        self.check_available()?;
        let mut audit = self.audit.write().await;
        if audit.iter().any(|e| e.id == entry.id) {
            return Err(StorageError::Duplicate(entry.id.clone()));
        }
        audit.push(entry.clone());
        Ok(())
    }

    async fn count_audit_entries(&self, query: &AuditQuery) -> StorageResult<u64> {
        self.check_available()?;
        let count = self.audit.read().await.iter().filter(|e| query.matches(e)).count();
        Ok(count as u64)
    }

    async fn delete_audit_entries_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        self.check_available()?;
        let mut audit = self.audit.write().await;
        let before = audit.len();
        audit.retain(|e| e.timestamp >= cutoff);
        Ok((before - audit.len()) as u64)
    }
}
