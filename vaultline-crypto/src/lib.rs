//! Encryption layer for Vaultline.
//!
//! Provides envelope encryption for stored vault payloads using:
//! - ChaCha20-Poly1305 for authenticated encryption (256-bit keys, 128-bit tags)
//! - A fresh random 96-bit nonce for every encryption
//! - Key zeroization on drop
//!
//! # Architecture
//!
//! The encryption uses a two-tier key system:
//!
//! 1. **Master Key (KEK)**: Supplied once from configuration at startup.
//!    It is never stored, logged, or returned by any API.
//!
//! 2. **Data Key (DEK)**: A random key generated for each encryption.
//!    The payload is encrypted with the DEK, then the DEK is encrypted with
//!    the master key and stored alongside the payload.
//!
//! Records written before envelope encryption (v1) hold the payload
//! encrypted directly under the master key; `KeyManager` can still read
//! them and re-encrypt them as v2.

pub mod cipher;
pub mod config;
pub mod envelope;
mod error;
mod key;
mod kms;

pub use cipher::{NONCE_SIZE, SealedPayload, TAG_SIZE};
pub use config::{KeyConfig, MASTER_KEY_ENV};
pub use envelope::{EncryptedPayload, EncryptionVersion, EnvelopeRecord, LegacyRecord};
pub use error::{CryptoError, CryptoResult};
pub use key::{DataKey, KEY_SIZE, MasterKey};
pub use kms::KeyManager;
