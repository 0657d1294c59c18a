//! Tamper-evident audit trail for Vaultline.
//!
//! Every monitored action becomes an `AuditLogEntry` in a per-user hash
//! chain. Entries are never updated; the only deletion is retention by age.
//!
//! # Layout
//!
//! - `chain`: canonical digest and stateless verification.
//! - `AuditLedger`: serialized append, stored-chain verification, retention.
//! - `KeyedLocks`: the per-key async locks behind serialized appends.

pub mod chain;
mod error;
mod ledger;
mod locks;

pub use chain::{
    ChainFields, ChainVerification, GENESIS_PREVIOUS_HASH, compute_entry_hash, verify_chain,
};
pub use error::{AuditError, AuditResult};
pub use ledger::{AuditLedger, NewAuditEntry};
pub use locks::{KeyedGuard, KeyedLocks};
