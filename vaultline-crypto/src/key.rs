//! Key material: the process-wide master key and ephemeral data keys.

use crate::error::{CryptoError, CryptoResult};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of every symmetric key in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// Key-encrypting key. Loaded once from configuration, never persisted.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; KEY_SIZE]);

impl MasterKey {
    /// Decodes a base64 master key, requiring exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let trimmed = encoded.trim();
        if trimmed.is_empty() {
            return Err(CryptoError::Configuration("master key is empty".into()));
        }

        let mut decoded = STANDARD
            .decode(trimmed)
            .map_err(|_| CryptoError::Configuration("master key is not valid base64".into()))?;

        if decoded.len() != KEY_SIZE {
            let actual = decoded.len();
            decoded.zeroize();
            return Err(CryptoError::Configuration(format!(
                "master key must decode to {KEY_SIZE} bytes, got {actual}"
            )));
        }

        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

/// Data-encrypting key. Generated per encryption call and dropped (zeroized)
/// as soon as it has been wrapped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DataKey([u8; KEY_SIZE]);

impl DataKey {
    /// Generates a fresh random DEK from the thread-local CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Rebuilds a DEK from unwrapped bytes. Any length other than 32 is
    /// reported as a decryption failure, since it can only come from a
    /// forged wrapped-key field.
    pub(crate) fn from_unwrapped(mut bytes: Vec<u8>) -> CryptoResult<Self> {
        if bytes.len() != KEY_SIZE {
            bytes.zeroize();
            return Err(CryptoError::Decryption);
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&bytes);
        bytes.zeroize();
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataKey([REDACTED])")
    }
}
