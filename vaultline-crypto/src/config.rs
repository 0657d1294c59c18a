//! Master key configuration.

use crate::error::{CryptoError, CryptoResult};
use crate::key::MasterKey;
use serde::Deserialize;
use std::fmt;
use zeroize::Zeroizing;

/// Environment variable holding the base64-encoded 256-bit master key.
pub const MASTER_KEY_ENV: &str = "VAULTLINE_MASTER_KEY";

/// Key configuration injected into `KeyManager` at startup.
#[derive(Clone, Default, Deserialize)]
pub struct KeyConfig {
    /// Base64-encoded master key. Zeroized on drop.
    master_key: Option<Zeroizing<String>>,
}

impl KeyConfig {
    pub fn new(master_key_base64: impl Into<String>) -> Self {
        Self {
            master_key: Some(Zeroizing::new(master_key_base64.into())),
        }
    }

    /// Reads the master key from `VAULTLINE_MASTER_KEY`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the master key through an arbitrary lookup (env, secret store, tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            master_key: lookup(MASTER_KEY_ENV).map(Zeroizing::new),
        }
    }

    pub fn is_set(&self) -> bool {
        self.master_key.as_ref().is_some_and(|k| !k.trim().is_empty())
    }

    /// Decodes and validates the configured key.
    pub(crate) fn master_key(&self) -> CryptoResult<MasterKey> {
        let encoded = self.master_key.as_ref().ok_or_else(|| {
            CryptoError::Configuration(format!("{MASTER_KEY_ENV} is not set"))
        })?;
        MasterKey::from_base64(encoded)
    }
}

impl fmt::Debug for KeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyConfig")
            .field("master_key", &self.master_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
