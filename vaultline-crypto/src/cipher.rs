//! ChaCha20-Poly1305 authenticated encryption with detached tags.
//!
//! Every call draws a fresh 96-bit nonce (the "IV") from the CSPRNG. The
//! ciphertext, IV and 128-bit tag are returned separately and base64 encoded
//! so they can be stored as plain text columns.

use crate::error::{CryptoError, CryptoResult};
use crate::key::KEY_SIZE;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce, Tag};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// Poly1305 tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// Output of a single encryption: base64 ciphertext, IV and auth tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedPayload {
    pub ciphertext: String,
    pub iv: String,
    pub auth_tag: String,
}

/// Encrypts `plaintext` under `key` with a freshly generated nonce.
pub fn encrypt(plaintext: &[u8], key: &[u8; KEY_SIZE]) -> CryptoResult<SealedPayload> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));

    let mut nonce = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce);

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", &mut buffer)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(SealedPayload {
        ciphertext: STANDARD.encode(&buffer),
        iv: STANDARD.encode(nonce),
        auth_tag: STANDARD.encode(tag),
    })
}

/// Decrypts a sealed payload. Malformed encodings, wrong lengths, a wrong
/// key and tampered bytes all fail the same way.
pub fn decrypt(sealed: &SealedPayload, key: &[u8; KEY_SIZE]) -> CryptoResult<Vec<u8>> {
    let nonce = decode_exact::<NONCE_SIZE>(&sealed.iv)?;
    let tag = decode_exact::<TAG_SIZE>(&sealed.auth_tag)?;
    let mut buffer = STANDARD
        .decode(&sealed.ciphertext)
        .map_err(|_| CryptoError::Decryption)?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&nonce),
            b"",
            &mut buffer,
            Tag::from_slice(&tag),
        )
        .map_err(|_| CryptoError::Decryption)?;

    Ok(buffer)
}

fn decode_exact<const N: usize>(encoded: &str) -> CryptoResult<[u8; N]> {
    let bytes = STANDARD.decode(encoded).map_err(|_| CryptoError::Decryption)?;
    bytes.try_into().map_err(|_| CryptoError::Decryption)
}
