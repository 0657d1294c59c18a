//! Migration error types.

use thiserror::Error;
use vaultline_audit::AuditError;
use vaultline_crypto::CryptoError;
use vaultline_storage::StorageError;

/// Result type for migration operations.
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Errors that can occur while migrating vault records.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("vault record not found: {0}")]
    NotFound(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("audit error: {0}")]
    Audit(#[from] AuditError),
}

impl MigrationError {
    /// Fatal errors abort a batch or background run instead of being
    /// collected per record: key configuration problems and persistence
    /// outages. A record that vanished mid-migration is not fatal.
    pub fn is_fatal(&self) -> bool {
        match self {
            MigrationError::NotFound(_) => false,
            MigrationError::Crypto(e) => e.is_configuration(),
            MigrationError::Storage(StorageError::NotFound(_)) => false,
            MigrationError::Storage(_) => true,
            MigrationError::Audit(_) => true,
        }
    }
}
