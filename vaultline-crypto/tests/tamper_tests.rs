//! Adversarial tests for envelope records.
//!
//! Flips bytes in every stored field and checks that decryption fails
//! instead of returning altered plaintext, and that every failure looks
//! the same to the caller.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use vaultline_crypto::{CryptoError, EnvelopeRecord, KeyConfig, KeyManager};

fn manager() -> KeyManager {
    KeyManager::new(&KeyConfig::new(STANDARD.encode([0x42u8; 32]))).unwrap()
}

/// Flips one bit of the decoded field at `index` and re-encodes it.
fn flip(field: &str, index: usize) -> String {
    let mut bytes = STANDARD.decode(field).unwrap();
    let i = index % bytes.len();
    bytes[i] ^= 0x01;
    STANDARD.encode(bytes)
}

fn assert_rejected(kms: &KeyManager, record: &EnvelopeRecord, what: &str) {
    match kms.envelope_decrypt(record) {
        Err(CryptoError::Decryption) => {}
        Ok(plain) => panic!("tampered {what} decrypted to {plain:?}"),
        Err(other) => panic!("tampered {what} gave unexpected error: {other:?}"),
    }
}

#[test]
fn flipping_any_ciphertext_byte_is_detected() {
    let kms = manager();
    let record = kms.envelope_encrypt(b"integrity-protected payload").unwrap();
    let len = STANDARD.decode(&record.encrypted_data).unwrap().len();

    for i in 0..len {
        let mut tampered = record.clone();
        tampered.encrypted_data = flip(&record.encrypted_data, i);
        assert_rejected(&kms, &tampered, "ciphertext");
    }
}

#[test]
fn flipping_payload_tag_is_detected() {
    let kms = manager();
    let record = kms.envelope_encrypt(b"payload").unwrap();
    for i in 0..16 {
        let mut tampered = record.clone();
        tampered.auth_tag = flip(&record.auth_tag, i);
        assert_rejected(&kms, &tampered, "payload tag");
    }
}

#[test]
fn flipping_dek_tag_is_detected() {
    let kms = manager();
    let record = kms.envelope_encrypt(b"payload").unwrap();
    for i in 0..16 {
        let mut tampered = record.clone();
        tampered.dek_auth_tag = flip(&record.dek_auth_tag, i);
        assert_rejected(&kms, &tampered, "DEK tag");
    }
}

#[test]
fn flipping_wrapped_dek_is_detected() {
    let kms = manager();
    let record = kms.envelope_encrypt(b"payload").unwrap();
    for i in 0..32 {
        let mut tampered = record.clone();
        tampered.encrypted_dek = flip(&record.encrypted_dek, i);
        assert_rejected(&kms, &tampered, "wrapped DEK");
    }
}

#[test]
fn flipping_either_iv_is_detected() {
    let kms = manager();
    let record = kms.envelope_encrypt(b"payload").unwrap();

    let mut tampered = record.clone();
    tampered.iv = flip(&record.iv, 0);
    assert_rejected(&kms, &tampered, "payload IV");

    let mut tampered = record.clone();
    tampered.dek_iv = flip(&record.dek_iv, 11);
    assert_rejected(&kms, &tampered, "DEK IV");
}

#[test]
fn swapping_wrapped_deks_between_records_fails() {
    let kms = manager();
    let a = kms.envelope_encrypt(b"record a").unwrap();
    let b = kms.envelope_encrypt(b"record b").unwrap();

    let mut franken = a.clone();
    franken.encrypted_dek = b.encrypted_dek.clone();
    franken.dek_iv = b.dek_iv.clone();
    franken.dek_auth_tag = b.dek_auth_tag.clone();

    assert_rejected(&kms, &franken, "swapped DEK");
}

#[test]
fn truncated_ciphertext_is_detected() {
    let kms = manager();
    let record = kms.envelope_encrypt(b"some longer payload here").unwrap();
    let mut bytes = STANDARD.decode(&record.encrypted_data).unwrap();
    bytes.truncate(bytes.len() / 2);

    let mut tampered = record.clone();
    tampered.encrypted_data = STANDARD.encode(bytes);
    assert_rejected(&kms, &tampered, "truncated ciphertext");
}

#[test]
fn wrong_kek_and_tampering_are_indistinguishable() {
    let kms = manager();
    let other = KeyManager::new(&KeyConfig::new(STANDARD.encode([0x43u8; 32]))).unwrap();
    let record = kms.envelope_encrypt(b"oracle check").unwrap();

    let wrong_key = other.envelope_decrypt(&record).unwrap_err().to_string();

    let mut tampered = record.clone();
    tampered.encrypted_data = flip(&record.encrypted_data, 0);
    let tampered_payload = kms.envelope_decrypt(&tampered).unwrap_err().to_string();

    assert_eq!(wrong_key, tampered_payload);
}
