//! Persisted record shapes and query filters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use vaultline_crypto::{EncryptedPayload, EncryptionVersion};

/// A stored vault item. Only `payload` and `updated_at` change after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRecord {
    pub id: String,
    pub user_id: String,
    pub category: String,
    pub label: Option<String>,
    pub payload: EncryptedPayload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VaultRecord {
    pub fn version(&self) -> EncryptionVersion {
        self.payload.version()
    }
}

/// Who performed an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    User,
    ThirdParty,
    System,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::User => "user",
            ActorType::ThirdParty => "third_party",
            ActorType::System => "system",
        }
    }
}

impl fmt::Display for ActorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ActorType::User),
            "third_party" => Ok(ActorType::ThirdParty),
            "system" => Ok(ActorType::System),
            other => Err(format!("unknown actor type: {other}")),
        }
    }
}

/// Monitored action recorded in the audit chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    DataCreated,
    DataAccessed,
    DataUpdated,
    DataDeleted,
    ConsentGranted,
    ConsentRevoked,
    ConsentExpired,
    EncryptionMigrated,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::DataCreated => "DATA_CREATED",
            AuditEventType::DataAccessed => "DATA_ACCESSED",
            AuditEventType::DataUpdated => "DATA_UPDATED",
            AuditEventType::DataDeleted => "DATA_DELETED",
            AuditEventType::ConsentGranted => "CONSENT_GRANTED",
            AuditEventType::ConsentRevoked => "CONSENT_REVOKED",
            AuditEventType::ConsentExpired => "CONSENT_EXPIRED",
            AuditEventType::EncryptionMigrated => "ENCRYPTION_MIGRATED",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DATA_CREATED" => Ok(AuditEventType::DataCreated),
            "DATA_ACCESSED" => Ok(AuditEventType::DataAccessed),
            "DATA_UPDATED" => Ok(AuditEventType::DataUpdated),
            "DATA_DELETED" => Ok(AuditEventType::DataDeleted),
            "CONSENT_GRANTED" => Ok(AuditEventType::ConsentGranted),
            "CONSENT_REVOKED" => Ok(AuditEventType::ConsentRevoked),
            "CONSENT_EXPIRED" => Ok(AuditEventType::ConsentExpired),
            "ENCRYPTION_MIGRATED" => Ok(AuditEventType::EncryptionMigrated),
            other => Err(format!("unknown audit event type: {other}")),
        }
    }
}

/// One link of a user's audit hash chain. Never updated after insert.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub user_id: String,
    pub event_type: AuditEventType,
    pub action: String,
    pub actor_id: String,
    pub actor_type: ActorType,
    pub vault_data_id: Option<String>,
    pub consent_id: Option<String>,
    /// Millisecond precision; strictly increasing per user.
    pub timestamp: DateTime<Utc>,
    pub previous_hash: Option<String>,
    pub current_hash: String,
    pub success: bool,
}

/// Filter for vault record lookups. Results are ordered by creation time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VaultQuery {
    pub user_id: Option<String>,
    pub version: Option<EncryptionVersion>,
    /// Inclusive lower bound on `created_at`.
    pub created_since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub created_until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl VaultQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn with_version(mut self, version: EncryptionVersion) -> Self {
        self.version = Some(version);
        self
    }

    pub fn created_between(
        mut self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_since = since;
        self.created_until = until;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &VaultRecord) -> bool {
        self.user_id.as_ref().is_none_or(|u| *u == record.user_id)
            && self.version.is_none_or(|v| v == record.version())
            && self.created_since.is_none_or(|t| record.created_at >= t)
            && self.created_until.is_none_or(|t| record.created_at < t)
    }
}

/// Filter for audit entries. Results are ordered oldest to newest.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuditQuery {
    pub user_id: Option<String>,
    /// Inclusive lower bound on `timestamp`.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `timestamp`.
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn between(mut self, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.user_id.as_ref().is_none_or(|u| *u == entry.user_id)
            && self.since.is_none_or(|t| entry.timestamp >= t)
            && self.until.is_none_or(|t| entry.timestamp < t)
    }
}
