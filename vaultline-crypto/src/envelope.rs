//! Stored payload formats.
//!
//! Two formats exist side by side while the migration engine runs:
//!
//! - **v1** (`LegacyRecord`): the payload is encrypted directly under the
//!   master key. Read-only; no new v1 rows are written by the service.
//! - **v2** (`EnvelopeRecord`): the payload is encrypted under a fresh data
//!   key, and that data key is itself encrypted under the master key.

use crate::cipher::SealedPayload;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Encryption scheme version tag as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionVersion {
    V1,
    V2,
}

impl EncryptionVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncryptionVersion::V1 => "v1",
            EncryptionVersion::V2 => "v2",
        }
    }
}

impl fmt::Display for EncryptionVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncryptionVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v1" => Ok(EncryptionVersion::V1),
            "v2" => Ok(EncryptionVersion::V2),
            other => Err(format!("unknown encryption version: {other}")),
        }
    }
}

/// Pre-envelope payload: single layer under the master key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyRecord {
    pub encrypted_data: String,
    pub iv: String,
    pub auth_tag: String,
}

impl LegacyRecord {
    pub(crate) fn sealed(&self) -> SealedPayload {
        SealedPayload {
            ciphertext: self.encrypted_data.clone(),
            iv: self.iv.clone(),
            auth_tag: self.auth_tag.clone(),
        }
    }
}

impl From<SealedPayload> for LegacyRecord {
    fn from(sealed: SealedPayload) -> Self {
        Self {
            encrypted_data: sealed.ciphertext,
            iv: sealed.iv,
            auth_tag: sealed.auth_tag,
        }
    }
}

/// Envelope-encrypted payload: data under a DEK, DEK wrapped by the master key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeRecord {
    /// Payload ciphertext (under the DEK).
    pub encrypted_data: String,
    /// Payload nonce.
    pub iv: String,
    /// Payload tag.
    pub auth_tag: String,
    /// DEK ciphertext (under the master key).
    pub encrypted_dek: String,
    /// DEK-layer nonce.
    pub dek_iv: String,
    /// DEK-layer tag.
    pub dek_auth_tag: String,
}

impl EnvelopeRecord {
    pub(crate) fn from_layers(payload: SealedPayload, wrapped_dek: SealedPayload) -> Self {
        Self {
            encrypted_data: payload.ciphertext,
            iv: payload.iv,
            auth_tag: payload.auth_tag,
            encrypted_dek: wrapped_dek.ciphertext,
            dek_iv: wrapped_dek.iv,
            dek_auth_tag: wrapped_dek.auth_tag,
        }
    }

    pub(crate) fn payload_layer(&self) -> SealedPayload {
        SealedPayload {
            ciphertext: self.encrypted_data.clone(),
            iv: self.iv.clone(),
            auth_tag: self.auth_tag.clone(),
        }
    }

    pub(crate) fn dek_layer(&self) -> SealedPayload {
        SealedPayload {
            ciphertext: self.encrypted_dek.clone(),
            iv: self.dek_iv.clone(),
            auth_tag: self.dek_auth_tag.clone(),
        }
    }

    pub fn version(&self) -> EncryptionVersion {
        EncryptionVersion::V2
    }
}

/// A stored payload in either format. All version dispatch goes through
/// this enum; nothing else inspects version strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "version")]
pub enum EncryptedPayload {
    #[serde(rename = "v1")]
    Legacy(LegacyRecord),
    #[serde(rename = "v2")]
    Envelope(EnvelopeRecord),
}

impl EncryptedPayload {
    pub fn version(&self) -> EncryptionVersion {
        match self {
            EncryptedPayload::Legacy(_) => EncryptionVersion::V1,
            EncryptedPayload::Envelope(_) => EncryptionVersion::V2,
        }
    }

    pub fn is_envelope(&self) -> bool {
        matches!(self, EncryptedPayload::Envelope(_))
    }

    /// Rebuilds a payload from flat storage columns.
    ///
    /// A row only counts as v2 when the version tag says so *and* all three
    /// wrap fields are present; anything else is read as v1 so the migration
    /// engine picks it up again.
    pub fn from_columns(
        version: Option<&str>,
        encrypted_data: String,
        iv: String,
        auth_tag: String,
        encrypted_dek: Option<String>,
        dek_iv: Option<String>,
        dek_auth_tag: Option<String>,
    ) -> Self {
        match (version, encrypted_dek, dek_iv, dek_auth_tag) {
            (Some("v2"), Some(encrypted_dek), Some(dek_iv), Some(dek_auth_tag)) => {
                EncryptedPayload::Envelope(EnvelopeRecord {
                    encrypted_data,
                    iv,
                    auth_tag,
                    encrypted_dek,
                    dek_iv,
                    dek_auth_tag,
                })
            }
            _ => EncryptedPayload::Legacy(LegacyRecord {
                encrypted_data,
                iv,
                auth_tag,
            }),
        }
    }
}

impl From<LegacyRecord> for EncryptedPayload {
    fn from(record: LegacyRecord) -> Self {
        EncryptedPayload::Legacy(record)
    }
}

impl From<EnvelopeRecord> for EncryptedPayload {
    fn from(record: EnvelopeRecord) -> Self {
        EncryptedPayload::Envelope(record)
    }
}
