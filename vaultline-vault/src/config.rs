//! Service configuration.

use crate::{VaultError, VaultResult};
use serde::Deserialize;
use vaultline_crypto::KeyConfig;
use vaultline_migration::MigrationOptions;

/// Environment variable for the audit retention window, in days.
pub const AUDIT_RETENTION_ENV: &str = "VAULTLINE_AUDIT_RETENTION_DAYS";

/// Everything `VaultService` needs at startup.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Master key source. Required; validated when the service is built.
    pub keys: KeyConfig,

    /// Defaults for background migration runs.
    pub migration: MigrationOptions,

    /// Audit entries older than this many days are eligible for purging.
    /// `None` keeps the trail forever.
    pub audit_retention_days: Option<u32>,
}

impl VaultConfig {
    pub fn new(keys: KeyConfig) -> Self {
        Self {
            keys,
            ..Self::default()
        }
    }

    /// Reads `VAULTLINE_MASTER_KEY` and `VAULTLINE_AUDIT_RETENTION_DAYS`.
    pub fn from_env() -> VaultResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> VaultResult<Self> {
        let audit_retention_days = match lookup(AUDIT_RETENTION_ENV) {
            Some(raw) => Some(raw.trim().parse::<u32>().map_err(|_| {
                VaultError::Config(format!(
                    "{AUDIT_RETENTION_ENV} must be a whole number of days, got {raw:?}"
                ))
            })?),
            None => None,
        };

        Ok(Self {
            keys: KeyConfig::from_lookup(&lookup),
            migration: MigrationOptions::default(),
            audit_retention_days,
        })
    }

    pub fn audit_retention(&self) -> Option<chrono::Duration> {
        self.audit_retention_days
            .map(|days| chrono::Duration::days(i64::from(days)))
    }
}
