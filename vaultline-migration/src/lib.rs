//! Online encryption migration for Vaultline.
//!
//! Moves stored records from the legacy single-layer scheme to envelope
//! encryption without downtime. Each record moves `v1 -> v2` atomically; a
//! failed record stays `v1` and is retried by a later batch.

mod engine;
mod error;
mod types;

pub use engine::{MIGRATION_ACTOR_ID, MigrationEngine, MigrationHandle};
pub use error::{MigrationError, MigrationResult};
pub use types::{
    BackgroundMigrationReport, BatchMigrationResult, MigrationOptions, MigrationOutcome,
    MigrationRecordError, MigrationStats, StopReason,
};
