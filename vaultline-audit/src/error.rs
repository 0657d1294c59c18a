//! Audit error types.

use thiserror::Error;
use vaultline_storage::StorageError;

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;

/// Errors that can occur while appending to or checking an audit chain.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("audit chain for user {user_id} is broken at entry {index}")]
    ChainIntegrity { user_id: String, index: usize },
}
