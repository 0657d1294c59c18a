//! Hash chain primitives.
//!
//! Each entry's `current_hash` is the hex SHA-256 of a canonical JSON
//! rendering of every other field, including `previous_hash`. Linking
//! `previous_hash` to the prior entry's digest makes the per-user log
//! tamper-evident: editing, reordering, or removing an interior entry breaks
//! verification at that position.

use chrono::{DateTime, Utc};
use serde_json::json;
use sha2::{Digest, Sha256};
use vaultline_storage::{ActorType, AuditEventType, AuditLogEntry};

/// Stand-in hashed for `previous_hash` when an entry starts a chain.
///
/// It is only ever a digest input. A stored `previous_hash` equal to it would
/// hash the same as NULL, so `verify_chain` rejects one.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// The hashed view of an audit entry: everything except `current_hash`.
#[derive(Debug, Clone, Copy)]
pub struct ChainFields<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub event_type: AuditEventType,
    pub action: &'a str,
    pub actor_id: &'a str,
    pub actor_type: ActorType,
    pub vault_data_id: Option<&'a str>,
    pub consent_id: Option<&'a str>,
    pub timestamp: DateTime<Utc>,
    pub previous_hash: Option<&'a str>,
    pub success: bool,
}

impl<'a> From<&'a AuditLogEntry> for ChainFields<'a> {
    fn from(entry: &'a AuditLogEntry) -> Self {
        Self {
            id: &entry.id,
            user_id: &entry.user_id,
            event_type: entry.event_type,
            action: &entry.action,
            actor_id: &entry.actor_id,
            actor_type: entry.actor_type,
            vault_data_id: entry.vault_data_id.as_deref(),
            consent_id: entry.consent_id.as_deref(),
            timestamp: entry.timestamp,
            previous_hash: entry.previous_hash.as_deref(),
            success: entry.success,
        }
    }
}

/// Canonical serialization: keys in lexical order, no whitespace, millisecond
/// timestamp.
fn canonical_json(fields: &ChainFields<'_>) -> String {
    json!({
        "action": fields.action,
        "actorId": fields.actor_id,
        "actorType": fields.actor_type.as_str(),
        "consentId": fields.consent_id,
        "eventType": fields.event_type.as_str(),
        "id": fields.id,
        "previousHash": fields.previous_hash.unwrap_or(GENESIS_PREVIOUS_HASH),
        "success": fields.success,
        "timestamp": fields.timestamp.timestamp_millis(),
        "userId": fields.user_id,
        "vaultDataId": fields.vault_data_id,
    })
    .to_string()
}

/// Hex SHA-256 digest over the canonical form of `fields`.
pub fn compute_entry_hash(fields: &ChainFields<'_>) -> String {
    let digest = Sha256::digest(canonical_json(fields).as_bytes());
    hex::encode(digest)
}

/// Outcome of checking a run of entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainVerification {
    pub valid: bool,
    /// Index (into the supplied slice) of the first entry that failed.
    pub broken_at_index: Option<usize>,
    /// Entries examined, including the failing one.
    pub entries_checked: usize,
}

impl ChainVerification {
    fn intact(entries_checked: usize) -> Self {
        Self {
            valid: true,
            broken_at_index: None,
            entries_checked,
        }
    }

    fn broken_at(index: usize) -> Self {
        Self {
            valid: false,
            broken_at_index: Some(index),
            entries_checked: index + 1,
        }
    }
}

/// Verifies a user's entries ordered oldest to newest.
///
/// The first supplied entry is accepted as the chain start even when its
/// `previous_hash` points at a purged predecessor; its own digest is still
/// checked. An empty slice is a valid chain.
pub fn verify_chain(entries: &[AuditLogEntry]) -> ChainVerification {
    let mut prior: Option<&AuditLogEntry> = None;

    for (index, entry) in entries.iter().enumerate() {
        if entry.previous_hash.as_deref() == Some(GENESIS_PREVIOUS_HASH) {
            return ChainVerification::broken_at(index);
        }
        if compute_entry_hash(&ChainFields::from(entry)) != entry.current_hash {
            return ChainVerification::broken_at(index);
        }
        if let Some(prior) = prior
            && entry.previous_hash.as_deref() != Some(prior.current_hash.as_str())
        {
            return ChainVerification::broken_at(index);
        }
        prior = Some(entry);
    }

    ChainVerification::intact(entries.len())
}
