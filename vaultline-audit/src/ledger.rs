//! Per-user append and verification over an `AuditRepository`.

use crate::chain::{ChainFields, ChainVerification, compute_entry_hash, verify_chain};
use crate::error::{AuditError, AuditResult};
use crate::locks::KeyedLocks;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;
use vaultline_storage::{ActorType, AuditEventType, AuditLogEntry, AuditQuery, AuditRepository};

/// A monitored action to be recorded. Hashing fields are filled in on append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuditEntry {
    pub user_id: String,
    pub event_type: AuditEventType,
    pub action: String,
    pub actor_id: String,
    pub actor_type: ActorType,
    pub vault_data_id: Option<String>,
    pub consent_id: Option<String>,
    pub success: bool,
}

impl NewAuditEntry {
    pub fn new(
        user_id: impl Into<String>,
        event_type: AuditEventType,
        action: impl Into<String>,
        actor_id: impl Into<String>,
        actor_type: ActorType,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            event_type,
            action: action.into(),
            actor_id: actor_id.into(),
            actor_type,
            vault_data_id: None,
            consent_id: None,
            success: true,
        }
    }

    pub fn with_vault_data(mut self, vault_data_id: impl Into<String>) -> Self {
        self.vault_data_id = Some(vault_data_id.into());
        self
    }

    pub fn with_consent(mut self, consent_id: impl Into<String>) -> Self {
        self.consent_id = Some(consent_id.into());
        self
    }

    /// Records the action as attempted but unsuccessful.
    pub fn failed(mut self) -> Self {
        self.success = false;
        self
    }
}

/// Appends to and verifies per-user audit chains.
///
/// Appends for one user are serialized by an async lock held across the
/// read-tip / hash / persist sequence, so two concurrent appends can never
/// link to the same tip. Different users never contend.
pub struct AuditLedger {
    repo: Arc<dyn AuditRepository>,
    user_locks: KeyedLocks,
}

impl AuditLedger {
    pub fn new(repo: Arc<dyn AuditRepository>) -> Self {
        Self {
            repo,
            user_locks: KeyedLocks::new(),
        }
    }

    #[cfg(test)]
    fn users_in_flight(&self) -> usize {
        self.user_locks.len()
    }

    /// Links a new entry to the user's current tip and persists it.
    pub async fn append_entry(&self, new: NewAuditEntry) -> AuditResult<AuditLogEntry> {
        let _guard = self.user_locks.lock(&new.user_id).await;

        let tip = self.repo.latest_audit_entry(&new.user_id).await?;
        let now = Utc::now().trunc_subsecs(3);
        let (timestamp, previous_hash) = match tip {
            Some(tip) => (
                now.max(tip.timestamp + Duration::milliseconds(1)),
                Some(tip.current_hash),
            ),
            None => (now, None),
        };

        let mut entry = AuditLogEntry {
            id: Uuid::now_v7().to_string(),
            user_id: new.user_id,
            event_type: new.event_type,
            action: new.action,
            actor_id: new.actor_id,
            actor_type: new.actor_type,
            vault_data_id: new.vault_data_id,
            consent_id: new.consent_id,
            timestamp,
            previous_hash,
            current_hash: String::new(),
            success: new.success,
        };
        entry.current_hash = compute_entry_hash(&ChainFields::from(&entry));

        self.repo.create_audit_entry(&entry).await?;
        debug!(
            user_id = %entry.user_id,
            event = %entry.event_type,
            "appended audit entry {}",
            entry.id
        );
        Ok(entry)
    }

    /// Loads and verifies a user's full chain.
    pub async fn verify_user_chain(&self, user_id: &str) -> AuditResult<ChainVerification> {
        let entries = self.repo.find_audit_entries(&AuditQuery::for_user(user_id)).await?;
        let result = verify_chain(&entries);
        if let Some(index) = result.broken_at_index {
            error!(
                user_id,
                index,
                entries = entries.len(),
                "audit chain integrity check failed, possible tampering"
            );
        }
        Ok(result)
    }

    /// Like `verify_user_chain`, but a broken chain is an error.
    pub async fn ensure_chain_intact(&self, user_id: &str) -> AuditResult<()> {
        match self.verify_user_chain(user_id).await?.broken_at_index {
            Some(index) => Err(AuditError::ChainIntegrity {
                user_id: user_id.to_string(),
                index,
            }),
            None => Ok(()),
        }
    }

    /// A user's entries in `[since, until)`, oldest first.
    pub async fn entries_for_user(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> AuditResult<Vec<AuditLogEntry>> {
        let query = AuditQuery::for_user(user_id).between(since, until);
        Ok(self.repo.find_audit_entries(&query).await?)
    }

    /// Retention: drops every entry older than `cutoff`, across all users.
    ///
    /// The oldest surviving entry of each chain becomes its new start.
    pub async fn purge_before(&self, cutoff: DateTime<Utc>) -> AuditResult<u64> {
        let removed = self.repo.delete_audit_entries_before(cutoff).await?;
        info!(removed, %cutoff, "purged expired audit entries");
        Ok(removed)
    }
}
