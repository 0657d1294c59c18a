//! Crypto error types.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors raised by the cipher primitive and the key management service.
///
/// `Decryption` carries no detail: a caller cannot tell a wrong
/// key from a tampered payload, or which envelope layer rejected the input.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key configuration: {0}")]
    Configuration(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed (wrong key or tampered data)")]
    Decryption,
}

impl CryptoError {
    /// Configuration errors are startup-fatal and never worth retrying.
    pub fn is_configuration(&self) -> bool {
        matches!(self, CryptoError::Configuration(_))
    }
}
