//! Key management service: envelope encryption under the process master key.

use crate::cipher;
use crate::config::KeyConfig;
use crate::envelope::{EncryptedPayload, EnvelopeRecord, LegacyRecord};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{DataKey, MasterKey};
use tracing::{debug, warn};

/// Known plaintext for the KEK liveness check.
const VERIFICATION_PLAINTEXT: &[u8] = b"vaultline-kek-verification-token-v1";

/// Owns the master key and performs every operation that needs it.
///
/// The master key is read once at construction and never leaves this type.
/// Share it across tasks as `Arc<KeyManager>`.
pub struct KeyManager {
    kek: MasterKey,
}

impl KeyManager {
    /// Builds the service, failing fast on a missing or malformed key.
    pub fn new(config: &KeyConfig) -> CryptoResult<Self> {
        let kek = config.master_key()?;
        debug!("key manager initialized");
        Ok(Self { kek })
    }

    /// Builds the service from an already decoded master key.
    pub fn from_master_key(kek: MasterKey) -> Self {
        Self { kek }
    }

    /// Encrypts `plaintext` under a fresh DEK and wraps the DEK under the KEK.
    pub fn envelope_encrypt(&self, plaintext: &[u8]) -> CryptoResult<EnvelopeRecord> {
        let dek = DataKey::generate();
        let payload = cipher::encrypt(plaintext, dek.as_bytes())?;
        let wrapped_dek = cipher::encrypt(dek.as_bytes(), self.kek.as_bytes())?;
        Ok(EnvelopeRecord::from_layers(payload, wrapped_dek))
    }

    /// Unwraps the DEK and decrypts the payload.
    ///
    /// Both layers fail with the same `CryptoError::Decryption`.
    pub fn envelope_decrypt(&self, record: &EnvelopeRecord) -> CryptoResult<Vec<u8>> {
        let dek_bytes = cipher::decrypt(&record.dek_layer(), self.kek.as_bytes())?;
        let dek = DataKey::from_unwrapped(dek_bytes)?;
        cipher::decrypt(&record.payload_layer(), dek.as_bytes())
    }

    /// Decrypts a v1 payload encrypted directly under the KEK.
    pub fn legacy_decrypt(&self, record: &LegacyRecord) -> CryptoResult<Vec<u8>> {
        cipher::decrypt(&record.sealed(), self.kek.as_bytes())
    }

    /// Produces a v1 payload. Only used to seed legacy data; new writes go
    /// through `envelope_encrypt`.
    pub fn legacy_encrypt(&self, plaintext: &[u8]) -> CryptoResult<LegacyRecord> {
        cipher::encrypt(plaintext, self.kek.as_bytes()).map(LegacyRecord::from)
    }

    /// Re-encrypts a v1 payload as v2. Nothing is produced unless the legacy
    /// payload authenticates.
    pub fn migrate_to_envelope_encryption(
        &self,
        record: &LegacyRecord,
    ) -> CryptoResult<EnvelopeRecord> {
        let plaintext = zeroize::Zeroizing::new(self.legacy_decrypt(record)?);
        self.envelope_encrypt(&plaintext)
    }

    /// Decrypts either payload format.
    pub fn decrypt_payload(&self, payload: &EncryptedPayload) -> CryptoResult<Vec<u8>> {
        match payload {
            EncryptedPayload::Envelope(record) => self.envelope_decrypt(record),
            EncryptedPayload::Legacy(record) => self.legacy_decrypt(record),
        }
    }

    /// Round-trips a fixed token under the KEK without touching stored data.
    pub fn verify_kek(&self) -> bool {
        let sealed = match cipher::encrypt(VERIFICATION_PLAINTEXT, self.kek.as_bytes()) {
            Ok(sealed) => sealed,
            Err(e) => {
                warn!("KEK verification encrypt failed: {e}");
                return false;
            }
        };
        match cipher::decrypt(&sealed, self.kek.as_bytes()) {
            Ok(plaintext) => plaintext == VERIFICATION_PLAINTEXT,
            Err(CryptoError::Decryption) => {
                warn!("KEK verification round trip failed");
                false
            }
            Err(e) => {
                warn!("KEK verification failed: {e}");
                false
            }
        }
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager").finish_non_exhaustive()
    }
}
