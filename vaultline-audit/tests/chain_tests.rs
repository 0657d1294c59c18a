//! Audit chain integration tests against the in-memory store.

use chrono::Duration;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use vaultline_audit::{
    AuditError, AuditLedger, ChainFields, GENESIS_PREVIOUS_HASH, NewAuditEntry, compute_entry_hash,
    verify_chain,
};
use vaultline_storage::{ActorType, AuditEventType, AuditLogEntry, AuditRepository, MemoryStore};

fn ledger() -> (AuditLedger, MemoryStore) {
    let store = MemoryStore::new();
    (AuditLedger::new(Arc::new(store.clone())), store)
}

fn access(user: &str, n: usize) -> NewAuditEntry {
    NewAuditEntry::new(
        user,
        AuditEventType::DataAccessed,
        format!("read #{n}"),
        "clinic-4",
        ActorType::ThirdParty,
    )
    .with_vault_data(format!("rec-{n}"))
}

async fn append_n(ledger: &AuditLedger, user: &str, n: usize) -> Vec<AuditLogEntry> {
    let mut entries = Vec::with_capacity(n);
    for i in 0..n {
        entries.push(ledger.append_entry(access(user, i)).await.unwrap());
    }
    entries
}

#[tokio::test]
async fn three_entry_chain_links_linearly() {
    let (ledger, _) = ledger();
    let entries = append_n(&ledger, "alice", 3).await;

    assert_eq!(entries[0].previous_hash, None);
    assert_eq!(entries[1].previous_hash.as_deref(), Some(entries[0].current_hash.as_str()));
    assert_eq!(entries[2].previous_hash.as_deref(), Some(entries[1].current_hash.as_str()));
    for entry in &entries {
        assert_eq!(entry.current_hash, compute_entry_hash(&ChainFields::from(entry)));
    }

    let result = ledger.verify_user_chain("alice").await.unwrap();
    assert!(result.valid);
    assert_eq!(result.broken_at_index, None);
    assert_eq!(result.entries_checked, 3);
}

#[tokio::test]
async fn unknown_user_has_valid_empty_chain() {
    let (ledger, _) = ledger();
    let result = ledger.verify_user_chain("nobody").await.unwrap();
    assert!(result.valid);
    assert_eq!(result.entries_checked, 0);
    ledger.ensure_chain_intact("nobody").await.unwrap();
}

#[tokio::test]
async fn timestamps_strictly_increase() {
    let (ledger, _) = ledger();
    let entries = append_n(&ledger, "alice", 20).await;
    for pair in entries.windows(2) {
        assert!(pair[1].timestamp > pair[0].timestamp);
    }
}

#[tokio::test]
async fn users_have_independent_chains() {
    let (ledger, _) = ledger();
    let a0 = ledger.append_entry(access("alice", 0)).await.unwrap();
    let b0 = ledger.append_entry(access("bob", 0)).await.unwrap();
    let a1 = ledger.append_entry(access("alice", 1)).await.unwrap();

    assert_eq!(b0.previous_hash, None);
    assert_eq!(a1.previous_hash.as_deref(), Some(a0.current_hash.as_str()));
    assert!(ledger.verify_user_chain("alice").await.unwrap().valid);
    assert!(ledger.verify_user_chain("bob").await.unwrap().valid);
}

#[tokio::test]
async fn every_field_is_covered_by_the_digest() {
    let (ledger, _) = ledger();
    let entries = append_n(&ledger, "alice", 3).await;

    let tampers: [(&str, fn(&mut AuditLogEntry)); 12] = [
        ("id", |e: &mut AuditLogEntry| e.id.push('x')),
        ("user_id", |e: &mut AuditLogEntry| e.user_id = "mallory".into()),
        ("event_type", |e: &mut AuditLogEntry| e.event_type = AuditEventType::DataDeleted),
        ("action", |e: &mut AuditLogEntry| e.action = "nothing to see".into()),
        ("actor_id", |e: &mut AuditLogEntry| e.actor_id = "someone-else".into()),
        ("actor_type", |e: &mut AuditLogEntry| e.actor_type = ActorType::System),
        ("vault_data_id", |e: &mut AuditLogEntry| e.vault_data_id = None),
        ("consent_id", |e: &mut AuditLogEntry| e.consent_id = Some("consent-forged".into())),
        ("timestamp", |e: &mut AuditLogEntry| e.timestamp += Duration::milliseconds(1)),
        ("previous_hash", |e: &mut AuditLogEntry| e.previous_hash = Some("0".repeat(64))),
        ("current_hash", |e: &mut AuditLogEntry| e.current_hash = "f".repeat(64)),
        ("success", |e: &mut AuditLogEntry| e.success = !e.success),
    ];

    for (field, tamper) in tampers {
        let mut forged = entries.clone();
        tamper(&mut forged[1]);
        let result = verify_chain(&forged);
        assert!(!result.valid, "tampering with {field} went undetected");
        assert_eq!(result.broken_at_index, Some(1), "field {field}");
        assert_eq!(result.entries_checked, 2, "field {field}");
    }
}

#[tokio::test]
async fn stored_sentinel_at_chain_start_is_rejected() {
    let (ledger, _) = ledger();
    let entries = append_n(&ledger, "alice", 2).await;
    assert_eq!(entries[0].previous_hash, None);

    let mut forged = entries.clone();
    forged[0].previous_hash = Some(GENESIS_PREVIOUS_HASH.to_string());
    // The digest alone cannot tell NULL from the sentinel.
    assert_eq!(compute_entry_hash(&ChainFields::from(&forged[0])), forged[0].current_hash);

    let result = verify_chain(&forged);
    assert!(!result.valid);
    assert_eq!(result.broken_at_index, Some(0));
    assert_eq!(result.entries_checked, 1);
}

#[tokio::test]
async fn reordering_and_removal_are_detected() {
    let (ledger, _) = ledger();
    let entries = append_n(&ledger, "alice", 4).await;

    let mut swapped = entries.clone();
    swapped.swap(1, 2);
    assert_eq!(verify_chain(&swapped).broken_at_index, Some(1));

    let mut gap = entries.clone();
    gap.remove(2);
    assert_eq!(verify_chain(&gap).broken_at_index, Some(2));
}

#[tokio::test]
async fn stored_forgery_fails_integrity_check() {
    let (ledger, store) = ledger();
    let entries = append_n(&ledger, "alice", 2).await;

    let mut forged = entries[1].clone();
    forged.id = "forged".into();
    forged.timestamp += Duration::seconds(5);
    forged.previous_hash = Some(entries[0].current_hash.clone());
    forged.current_hash = compute_entry_hash(&ChainFields::from(&forged));
    store.create_audit_entry(&forged).await.unwrap();

    let err = ledger.ensure_chain_intact("alice").await.unwrap_err();
    match err {
        AuditError::ChainIntegrity { user_id, index } => {
            assert_eq!(user_id, "alice");
            assert_eq!(index, 2);
        }
        other => panic!("expected ChainIntegrity, got {other}"),
    }
}

#[tokio::test]
async fn retention_purge_leaves_a_valid_chain() {
    let (ledger, _) = ledger();
    let entries = append_n(&ledger, "alice", 5).await;

    let removed = ledger.purge_before(entries[2].timestamp).await.unwrap();
    assert_eq!(removed, 2);

    let remaining = ledger.entries_for_user("alice", None, None).await.unwrap();
    assert_eq!(remaining.first().map(|e| e.id.clone()), Some(entries[2].id.clone()));
    assert!(remaining[0].previous_hash.is_some());

    let result = ledger.verify_user_chain("alice").await.unwrap();
    assert!(result.valid);
    assert_eq!(result.entries_checked, 3);

    let next = ledger.append_entry(access("alice", 5)).await.unwrap();
    assert_eq!(next.previous_hash.as_deref(), Some(entries[4].current_hash.as_str()));
}

#[tokio::test]
async fn entries_for_user_respects_window() {
    let (ledger, _) = ledger();
    let entries = append_n(&ledger, "alice", 4).await;

    let window = ledger
        .entries_for_user("alice", Some(entries[1].timestamp), Some(entries[3].timestamp))
        .await
        .unwrap();
    let ids: Vec<_> = window.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec![entries[1].id.as_str(), entries[2].id.as_str()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_produce_a_linear_chain() {
    let (ledger, _) = ledger();
    let ledger = Arc::new(ledger);

    let tasks: Vec<_> = (0..25)
        .map(|i| {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move { ledger.append_entry(access("alice", i)).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let result = ledger.verify_user_chain("alice").await.unwrap();
    assert!(result.valid);
    assert_eq!(result.entries_checked, 25);

    let chain = ledger.entries_for_user("alice", None, None).await.unwrap();
    assert_eq!(chain.iter().filter(|e| e.previous_hash.is_none()).count(), 1);
}

#[tokio::test]
async fn storage_outage_surfaces_as_storage_error() {
    let (ledger, store) = ledger();
    store.set_available(false);
    let err = ledger.append_entry(access("alice", 0)).await.unwrap_err();
    assert!(matches!(err, AuditError::Storage(_)));
}
