//! DuckDB-backed store for vault records and the audit log.

use crate::error::{StorageError, StorageResult};
use crate::records::{
    ActorType, AuditEventType, AuditLogEntry, AuditQuery, VaultQuery, VaultRecord,
};
use crate::repository::{AuditRepository, VaultRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::types::Value;
use duckdb::{Connection, params, params_from_iter};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;
use vaultline_crypto::{EncryptedPayload, EncryptionVersion};

const VAULT_COLUMNS: &str = "id, user_id, category, label, encrypted_data, iv, auth_tag, \
     encrypted_dek, dek_iv, dek_auth_tag, encryption_version, created_at, updated_at";

const AUDIT_COLUMNS: &str = "id, user_id, event_type, action, actor_id, actor_type, \
     vault_data_id, consent_id, timestamp_ms, previous_hash, current_hash, success";

/// Mirrors `EncryptedPayload::from_columns`: a row is v2 only when tagged
/// so and carrying all three wrap fields.
const IS_ENVELOPE: &str = "(encryption_version = 'v2' AND encrypted_dek IS NOT NULL \
     AND dek_iv IS NOT NULL AND dek_auth_tag IS NOT NULL)";

/// Persists vault records and audit entries in DuckDB.
#[derive(Clone)]
pub struct DuckDbStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbStore {
    /// Opens or creates a store at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = crate::open_duckdb_with_wal_recovery(path, "128MB", 1)?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` against the connection on the blocking pool, so DuckDB I/O
    /// never stalls a runtime worker.
    async fn with_conn<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Connection) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&lock_conn(&conn)))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

/// Acquires the connection, recovering from a poisoned lock.
fn lock_conn(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(|poisoned| {
        warn!("recovering from poisoned DuckDB connection lock");
        poisoned.into_inner()
    })
}

// ============================================================================
// Row mapping
// ============================================================================

struct VaultRow {
    id: String,
    user_id: String,
    category: String,
    label: Option<String>,
    encrypted_data: String,
    iv: String,
    auth_tag: String,
    encrypted_dek: Option<String>,
    dek_iv: Option<String>,
    dek_auth_tag: Option<String>,
    encryption_version: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl VaultRow {
    fn read(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            category: row.get(2)?,
            label: row.get(3)?,
            encrypted_data: row.get(4)?,
            iv: row.get(5)?,
            auth_tag: row.get(6)?,
            encrypted_dek: row.get(7)?,
            dek_iv: row.get(8)?,
            dek_auth_tag: row.get(9)?,
            encryption_version: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn into_record(self) -> StorageResult<VaultRecord> {
        let payload = EncryptedPayload::from_columns(
            self.encryption_version.as_deref(),
            self.encrypted_data,
            self.iv,
            self.auth_tag,
            self.encrypted_dek,
            self.dek_iv,
            self.dek_auth_tag,
        );
        Ok(VaultRecord {
            created_at: from_millis(self.created_at, &self.id)?,
            updated_at: from_millis(self.updated_at, &self.id)?,
            id: self.id,
            user_id: self.user_id,
            category: self.category,
            label: self.label,
            payload,
        })
    }
}

struct AuditRow {
    id: String,
    user_id: String,
    event_type: String,
    action: String,
    actor_id: String,
    actor_type: String,
    vault_data_id: Option<String>,
    consent_id: Option<String>,
    timestamp_ms: i64,
    previous_hash: Option<String>,
    current_hash: String,
    success: bool,
}

impl AuditRow {
    fn read(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            event_type: row.get(2)?,
            action: row.get(3)?,
            actor_id: row.get(4)?,
            actor_type: row.get(5)?,
            vault_data_id: row.get(6)?,
            consent_id: row.get(7)?,
            timestamp_ms: row.get(8)?,
            previous_hash: row.get(9)?,
            current_hash: row.get(10)?,
            success: row.get(11)?,
        })
    }

    fn into_entry(self) -> StorageResult<AuditLogEntry> {
        let event_type = self
            .event_type
            .parse::<AuditEventType>()
            .map_err(|e| StorageError::Corrupt(format!("audit entry {}: {e}", self.id)))?;
        let actor_type = self
            .actor_type
            .parse::<ActorType>()
            .map_err(|e| StorageError::Corrupt(format!("audit entry {}: {e}", self.id)))?;
        Ok(AuditLogEntry {
            timestamp: from_millis(self.timestamp_ms, &self.id)?,
            id: self.id,
            user_id: self.user_id,
            event_type,
            action: self.action,
            actor_id: self.actor_id,
            actor_type,
            vault_data_id: self.vault_data_id,
            consent_id: self.consent_id,
            previous_hash: self.previous_hash,
            current_hash: self.current_hash,
            success: self.success,
        })
    }
}

fn from_millis(ms: i64, id: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StorageError::Corrupt(format!("row {id}: timestamp {ms} out of range")))
}

/// Flattens a payload into (data, iv, tag, dek, dek_iv, dek_tag, version).
#[allow(clippy::type_complexity)]
fn payload_columns(
    payload: &EncryptedPayload,
) -> (&str, &str, &str, Option<&str>, Option<&str>, Option<&str>, &'static str) {
    match payload {
        EncryptedPayload::Legacy(r) => (
            r.encrypted_data.as_str(),
            r.iv.as_str(),
            r.auth_tag.as_str(),
            None,
            None,
            None,
            EncryptionVersion::V1.as_str(),
        ),
        EncryptedPayload::Envelope(r) => (
            r.encrypted_data.as_str(),
            r.iv.as_str(),
            r.auth_tag.as_str(),
            Some(r.encrypted_dek.as_str()),
            Some(r.dek_iv.as_str()),
            Some(r.dek_auth_tag.as_str()),
            EncryptionVersion::V2.as_str(),
        ),
    }
}

fn vault_where(query: &VaultQuery) -> (String, Vec<Value>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut values = Vec::new();

    if let Some(user_id) = &query.user_id {
        clauses.push("user_id = ?".into());
        values.push(Value::Text(user_id.clone()));
    }
    match query.version {
        Some(EncryptionVersion::V2) => clauses.push(IS_ENVELOPE.into()),
        Some(EncryptionVersion::V1) => clauses.push(format!("NOT {IS_ENVELOPE}")),
        None => {}
    }
    if let Some(since) = query.created_since {
        clauses.push("created_at >= ?".into());
        values.push(Value::BigInt(since.timestamp_millis()));
    }
    if let Some(until) = query.created_until {
        clauses.push("created_at < ?".into());
        values.push(Value::BigInt(until.timestamp_millis()));
    }

    (where_sql(&clauses), values)
}

fn audit_where(query: &AuditQuery) -> (String, Vec<Value>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut values = Vec::new();

    if let Some(user_id) = &query.user_id {
        clauses.push("user_id = ?".into());
        values.push(Value::Text(user_id.clone()));
    }
    if let Some(since) = query.since {
        clauses.push("timestamp_ms >= ?".into());
        values.push(Value::BigInt(since.timestamp_millis()));
    }
    if let Some(until) = query.until {
        clauses.push("timestamp_ms < ?".into());
        values.push(Value::BigInt(until.timestamp_millis()));
    }

    (where_sql(&clauses), values)
}

fn where_sql(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

fn limit_sql(limit: Option<usize>) -> String {
    limit.map(|n| format!(" LIMIT {n}")).unwrap_or_default()
}

// ============================================================================
// Repository impls
// ============================================================================

#[async_trait]
impl VaultRepository for DuckDbStore {
    async fn find_vault_record(&self, id: &str) -> StorageResult<Option<VaultRecord>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let result = conn.query_row(
                &format!("SELECT {VAULT_COLUMNS} FROM vault_data WHERE id = ?"),
                params![id],
                VaultRow::read,
            );

            match result {
                Ok(row) => row.into_record().map(Some),
                Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn find_vault_records(&self, query: &VaultQuery) -> StorageResult<Vec<VaultRecord>> {
        let (filter, values) = vault_where(query);
        let sql = format!(
            "SELECT {VAULT_COLUMNS} FROM vault_data{filter} ORDER BY created_at, id{}",
            limit_sql(query.limit)
        );
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values), VaultRow::read)?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter().map(VaultRow::into_record).collect()
        })
        .await
    }

    async fn create_vault_record(&self, record: &VaultRecord) -> StorageResult<()> {
        let record = record.clone();
        self.with_conn(move |conn| {
            let exists: i64 = conn.query_row(
                "SELECT COUNT(*) FROM vault_data WHERE id = ?",
                params![record.id],
                |row| row.get(0),
            )?;
            if exists > 0 {
                return Err(StorageError::Duplicate(record.id));
            }

            let (data, iv, tag, dek, dek_iv, dek_tag, version) = payload_columns(&record.payload);
            conn.execute(
                &format!(
                    "INSERT INTO vault_data ({VAULT_COLUMNS}) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                ),
                params![
                    record.id,
                    record.user_id,
                    record.category,
                    record.label,
                    data,
                    iv,
                    tag,
                    dek,
                    dek_iv,
                    dek_tag,
                    version,
                    record.created_at.timestamp_millis(),
                    record.updated_at.timestamp_millis(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_vault_payload(
        &self,
        id: &str,
        payload: &EncryptedPayload,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let id = id.to_string();
        let payload = payload.clone();
        self.with_conn(move |conn| {
            let (data, iv, tag, dek, dek_iv, dek_tag, version) = payload_columns(&payload);
            let affected = conn.execute(
                "UPDATE vault_data SET encrypted_data = ?, iv = ?, auth_tag = ?, \
                 encrypted_dek = ?, dek_iv = ?, dek_auth_tag = ?, encryption_version = ?, \
                 updated_at = ? WHERE id = ?",
                params![
                    data,
                    iv,
                    tag,
                    dek,
                    dek_iv,
                    dek_tag,
                    version,
                    updated_at.timestamp_millis(),
                    id,
                ],
            )?;

            if affected == 0 {
                return Err(StorageError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn count_vault_records(&self, query: &VaultQuery) -> StorageResult<u64> {
        let (filter, values) = vault_where(query);
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM vault_data{filter}"),
                params_from_iter(values),
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
        .await
    }
}

#[async_trait]
impl AuditRepository for DuckDbStore {
    async fn latest_audit_entry(&self, user_id: &str) -> StorageResult<Option<AuditLogEntry>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let result = conn.query_row(
                &format!(
                    "SELECT {AUDIT_COLUMNS} FROM audit_logs WHERE user_id = ? \
                     ORDER BY timestamp_ms DESC LIMIT 1"
                ),
                params![user_id],
                AuditRow::read,
            );

            match result {
                Ok(row) => row.into_entry().map(Some),
                Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn find_audit_entries(&self, query: &AuditQuery) -> StorageResult<Vec<AuditLogEntry>> {
        let (filter, values) = audit_where(query);
        let sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_logs{filter} ORDER BY timestamp_ms, id{}",
            limit_sql(query.limit)
        );
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values), AuditRow::read)?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter().map(AuditRow::into_entry).collect()
        })
        .await
    }

    async fn create_audit_entry(&self, entry: &AuditLogEntry) -> StorageResult<()> {
        let entry = entry.clone();
        self.with_conn(move |conn| {
            let exists: i64 = conn.query_row(
                "SELECT COUNT(*) FROM audit_logs WHERE id = ?",
                params![entry.id],
                |row| row.get(0),
            )?;
            if exists > 0 {
                return Err(StorageError::Duplicate(entry.id));
            }

            conn.execute(
                &format!(
                    "INSERT INTO audit_logs ({AUDIT_COLUMNS}) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                ),
                params![
                    entry.id,
                    entry.user_id,
                    entry.event_type.as_str(),
                    entry.action,
                    entry.actor_id,
                    entry.actor_type.as_str(),
                    entry.vault_data_id,
                    entry.consent_id,
                    entry.timestamp.timestamp_millis(),
                    entry.previous_hash,
                    entry.current_hash,
                    entry.success,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn count_audit_entries(&self, query: &AuditQuery) -> StorageResult<u64> {
        let (filter, values) = audit_where(query);
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM audit_logs{filter}"),
                params_from_iter(values),
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    async fn delete_audit_entries_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let cutoff_ms = cutoff.timestamp_millis();
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM audit_logs WHERE timestamp_ms < ?",
                params![cutoff_ms],
            )?;
            Ok(removed as u64)
        })
        .await
    }
}

fn initialize_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS vault_data (
            id VARCHAR PRIMARY KEY,
            user_id VARCHAR NOT NULL,
            category VARCHAR NOT NULL,
            label VARCHAR,
            encrypted_data TEXT NOT NULL,
            iv VARCHAR NOT NULL,
            auth_tag VARCHAR NOT NULL,
            encrypted_dek TEXT,
            dek_iv VARCHAR,
            dek_auth_tag VARCHAR,
            encryption_version VARCHAR NOT NULL DEFAULT 'v1',
            created_at BIGINT NOT NULL,
            updated_at BIGINT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_vault_user ON vault_data(user_id);

        CREATE TABLE IF NOT EXISTS audit_logs (
            id VARCHAR PRIMARY KEY,
            user_id VARCHAR NOT NULL,
            event_type VARCHAR NOT NULL,
            action TEXT NOT NULL,
            actor_id VARCHAR NOT NULL,
            actor_type VARCHAR NOT NULL,
            vault_data_id VARCHAR,
            consent_id VARCHAR,
            timestamp_ms BIGINT NOT NULL,
            previous_hash VARCHAR,
            current_hash VARCHAR NOT NULL,
            success BOOLEAN NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_audit_user_time ON audit_logs(user_id, timestamp_ms);
        "#,
    )?;
    Ok(())
}
