//! Behavioural tests shared by every repository implementation.

use chrono::{DateTime, Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use vaultline_crypto::{EncryptedPayload, EncryptionVersion, EnvelopeRecord, LegacyRecord};
use vaultline_storage::{
    ActorType, AuditEventType, AuditLogEntry, AuditQuery, AuditRepository, DuckDbStore,
    MemoryStore, StorageError, VaultQuery, VaultRecord, VaultRepository,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

fn legacy() -> EncryptedPayload {
    EncryptedPayload::Legacy(LegacyRecord {
        encrypted_data: "Y2lwaGVy".into(),
        iv: "aXY=".into(),
        auth_tag: "dGFn".into(),
    })
}

fn envelope(marker: &str) -> EncryptedPayload {
    EncryptedPayload::Envelope(EnvelopeRecord {
        encrypted_data: format!("data-{marker}"),
        iv: "iv".into(),
        auth_tag: "tag".into(),
        encrypted_dek: format!("dek-{marker}"),
        dek_iv: "dek-iv".into(),
        dek_auth_tag: "dek-tag".into(),
    })
}

fn record(id: &str, user: &str, payload: EncryptedPayload, minute: i64) -> VaultRecord {
    let at = t0() + Duration::minutes(minute);
    VaultRecord {
        id: id.into(),
        user_id: user.into(),
        category: "medical".into(),
        label: Some(format!("label {id}")),
        payload,
        created_at: at,
        updated_at: at,
    }
}

fn audit(id: &str, user: &str, minute: i64) -> AuditLogEntry {
    AuditLogEntry {
        id: id.into(),
        user_id: user.into(),
        event_type: AuditEventType::DataAccessed,
        action: format!("read {id}"),
        actor_id: "third-party-7".into(),
        actor_type: ActorType::ThirdParty,
        vault_data_id: Some("rec-1".into()),
        consent_id: None,
        timestamp: t0() + Duration::minutes(minute),
        previous_hash: (minute > 0).then(|| format!("hash-{}", minute - 1)),
        current_hash: format!("hash-{minute}"),
        success: true,
    }
}

async fn vault_crud(store: &dyn VaultRepository) {
    store.create_vault_record(&record("a", "alice", legacy(), 0)).await.unwrap();
    store.create_vault_record(&record("b", "alice", envelope("b"), 1)).await.unwrap();
    store.create_vault_record(&record("c", "bob", legacy(), 2)).await.unwrap();

    let found = store.find_vault_record("b").await.unwrap().unwrap();
    assert_eq!(found, record("b", "alice", envelope("b"), 1));
    assert!(store.find_vault_record("missing").await.unwrap().is_none());

    let alice = store.find_vault_records(&VaultQuery::for_user("alice")).await.unwrap();
    assert_eq!(alice.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);

    let v1 = VaultQuery::all().with_version(EncryptionVersion::V1);
    assert_eq!(store.count_vault_records(&v1).await.unwrap(), 2);
    let first_v1 = store.find_vault_records(&v1.clone().with_limit(1)).await.unwrap();
    assert_eq!(first_v1.len(), 1);
    assert_eq!(first_v1[0].id, "a");

    let window = VaultQuery::all().created_between(Some(t0() + Duration::minutes(1)), None);
    assert_eq!(store.count_vault_records(&window).await.unwrap(), 2);
}

async fn vault_update_in_place(store: &dyn VaultRepository) {
    store.create_vault_record(&record("a", "alice", legacy(), 0)).await.unwrap();

    let later = t0() + Duration::hours(1);
    store.update_vault_payload("a", &envelope("a"), later).await.unwrap();

    let updated = store.find_vault_record("a").await.unwrap().unwrap();
    assert_eq!(updated.version(), EncryptionVersion::V2);
    assert_eq!(updated.payload, envelope("a"));
    assert_eq!(updated.created_at, t0());
    assert_eq!(updated.updated_at, later);
    assert_eq!(updated.label.as_deref(), Some("label a"));
    assert_eq!(updated.category, "medical");

    let err = store.update_vault_payload("ghost", &legacy(), later).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound(id) if id == "ghost"));
}

async fn vault_rejects_duplicates(store: &dyn VaultRepository) {
    store.create_vault_record(&record("a", "alice", legacy(), 0)).await.unwrap();
    let err = store.create_vault_record(&record("a", "alice", legacy(), 0)).await.unwrap_err();
    assert!(matches!(err, StorageError::Duplicate(_)));
}

async fn audit_ordering_and_retention(store: &dyn AuditRepository) {
    for (i, id) in ["e0", "e1", "e2", "e3"].iter().enumerate() {
        store.create_audit_entry(&audit(id, "alice", i as i64)).await.unwrap();
    }
    store.create_audit_entry(&audit("x0", "bob", 0)).await.unwrap();

    let tip = store.latest_audit_entry("alice").await.unwrap().unwrap();
    assert_eq!(tip.id, "e3");
    assert!(store.latest_audit_entry("carol").await.unwrap().is_none());

    let chain = store.find_audit_entries(&AuditQuery::for_user("alice")).await.unwrap();
    assert_eq!(
        chain.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
        vec!["e0", "e1", "e2", "e3"]
    );
    assert_eq!(chain[2], audit("e2", "alice", 2));

    let window = AuditQuery::for_user("alice")
        .between(Some(t0() + Duration::minutes(1)), Some(t0() + Duration::minutes(3)));
    assert_eq!(store.count_audit_entries(&window).await.unwrap(), 2);

    let removed = store
        .delete_audit_entries_before(t0() + Duration::minutes(2))
        .await
        .unwrap();
    assert_eq!(removed, 3, "e0, e1 and bob's x0");

    let remaining = store.find_audit_entries(&AuditQuery::for_user("alice")).await.unwrap();
    assert_eq!(remaining.first().map(|e| e.id.as_str()), Some("e2"));
    assert_eq!(remaining.len(), 2);
}

// ── MemoryStore ──

#[tokio::test]
async fn memory_vault_crud() {
    vault_crud(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_vault_update_in_place() {
    vault_update_in_place(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_vault_rejects_duplicates() {
    vault_rejects_duplicates(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_audit_ordering_and_retention() {
    audit_ordering_and_retention(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_outage_fails_every_call() {
    let store = MemoryStore::new();
    store.set_available(false);

    let err = store.count_vault_records(&VaultQuery::all()).await.unwrap_err();
    assert!(matches!(err, StorageError::Unavailable(_)));
    assert!(store.latest_audit_entry("alice").await.is_err());

    store.set_available(true);
    assert_eq!(store.count_vault_records(&VaultQuery::all()).await.unwrap(), 0);
}

#[tokio::test]
async fn memory_clones_share_data() {
    let store = MemoryStore::new();
    let clone = store.clone();
    store.create_vault_record(&record("a", "alice", legacy(), 0)).await.unwrap();
    assert!(clone.find_vault_record("a").await.unwrap().is_some());
}

// ── DuckDbStore ──

#[tokio::test]
async fn duckdb_vault_crud() {
    vault_crud(&DuckDbStore::open_in_memory().unwrap()).await;
}

#[tokio::test]
async fn duckdb_vault_update_in_place() {
    vault_update_in_place(&DuckDbStore::open_in_memory().unwrap()).await;
}

#[tokio::test]
async fn duckdb_vault_rejects_duplicates() {
    vault_rejects_duplicates(&DuckDbStore::open_in_memory().unwrap()).await;
}

#[tokio::test]
async fn duckdb_audit_ordering_and_retention() {
    audit_ordering_and_retention(&DuckDbStore::open_in_memory().unwrap()).await;
}

#[tokio::test]
async fn duckdb_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vault.duckdb");
    let id = uuid::Uuid::new_v4().to_string();

    {
        let store = DuckDbStore::open(&path).unwrap();
        store.create_vault_record(&record(&id, "alice", envelope("p"), 0)).await.unwrap();
        store.create_audit_entry(&audit("e0", "alice", 0)).await.unwrap();
    }

    let reopened = DuckDbStore::open(&path).unwrap();
    let found = reopened.find_vault_record(&id).await.unwrap().unwrap();
    assert_eq!(found.payload, envelope("p"));
    assert_eq!(reopened.latest_audit_entry("alice").await.unwrap().unwrap().id, "e0");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duckdb_handles_concurrent_writers() {
    let store = DuckDbStore::open_in_memory().unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|n| {
            let store = store.clone();
            tokio::spawn(async move {
                let id = format!("rec-{n:02}");
                store.create_vault_record(&record(&id, "alice", legacy(), n)).await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(store.count_vault_records(&VaultQuery::for_user("alice")).await.unwrap(), 16);
}
