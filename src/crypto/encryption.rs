//! AES-256-GCM Encryption Implementation
//!
//! Confidentiality plus integrity: any change to the ciphertext, nonce, tag
//! or associated data is caught before a single plaintext byte is returned.

use crate::crypto::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};
use crate::error::{Error, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};

/// Output of one encryption: ciphertext with its nonce and detached tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedData {
    /// Nonce used for encryption (unique per encryption)
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext, same length as the plaintext
    pub ciphertext: Vec<u8>,
    /// GCM authentication tag
    pub tag: [u8; TAG_SIZE],
}

/// Encrypt data using AES-256-GCM
///
/// # Arguments
/// * `key` - 256-bit encryption key
/// * `plaintext` - Data to encrypt
/// * `aad` - Additional authenticated data (authenticated but not encrypted)
pub fn encrypt(key: &[u8; KEY_SIZE], plaintext: &[u8], aad: &[u8]) -> Result<SealedData> {
    let unbound_key = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| Error::Encryption("Failed to create encryption key".to_string()))?;
    let sealing_key = LessSafeKey::new(unbound_key);

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = plaintext.to_vec();
    let tag = sealing_key
        .seal_in_place_separate_tag(nonce, Aad::from(aad), &mut in_out)
        .map_err(|_| Error::Encryption("Encryption failed".to_string()))?;

    let mut tag_bytes = [0u8; TAG_SIZE];
    tag_bytes.copy_from_slice(tag.as_ref());

    Ok(SealedData {
        nonce: nonce_bytes,
        ciphertext: in_out,
        tag: tag_bytes,
    })
}

/// Decrypt data using AES-256-GCM
///
/// Returns `Error::AuthenticationFailed` when the key is wrong or any input
/// was modified.
pub fn decrypt(
    key: &[u8; KEY_SIZE],
    ciphertext: &[u8],
    nonce: &[u8],
    tag: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    if nonce.len() != NONCE_SIZE {
        return Err(Error::MalformedEnvelope(format!(
            "Invalid nonce length: {}",
            nonce.len()
        )));
    }

    if tag.len() != TAG_SIZE {
        return Err(Error::MalformedEnvelope(format!(
            "Invalid tag length: {}",
            tag.len()
        )));
    }

    let unbound_key = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| Error::Encryption("Failed to create decryption key".to_string()))?;
    let opening_key = LessSafeKey::new(unbound_key);

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    nonce_bytes.copy_from_slice(nonce);
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = Vec::with_capacity(ciphertext.len() + TAG_SIZE);
    in_out.extend_from_slice(ciphertext);
    in_out.extend_from_slice(tag);

    let plaintext = opening_key
        .open_in_place(nonce, Aad::from(aad), &mut in_out)
        .map_err(|_| Error::AuthenticationFailed)?;

    Ok(plaintext.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        key
    }

    fn open(key: &[u8; KEY_SIZE], sealed: &SealedData, aad: &[u8]) -> Result<Vec<u8>> {
        decrypt(key, &sealed.ciphertext, &sealed.nonce, &sealed.tag, aad)
    }

    #[test]
    fn test_encrypt_decrypt() {
        let key = test_key();
        let plaintext = b"Hello, paperseal!";

        let sealed = encrypt(&key, plaintext, b"").unwrap();
        assert_eq!(sealed.ciphertext.len(), plaintext.len());
        assert_ne!(sealed.ciphertext.as_slice(), plaintext.as_slice());

        assert_eq!(open(&key, &sealed, b"").unwrap(), plaintext);
    }

    #[test]
    fn test_wrong_aad_fails() {
        let key = test_key();
        let sealed = encrypt(&key, b"Secret data", b"receipt.pdf").unwrap();
        assert!(matches!(
            open(&key, &sealed, b"receipt.png"),
            Err(Error::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = encrypt(&test_key(), b"Secret data", b"").unwrap();
        assert!(matches!(
            open(&test_key(), &sealed, b""),
            Err(Error::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_tampering_detected() {
        let key = test_key();
        let sealed = encrypt(&key, b"Secret data", b"").unwrap();

        let mut bad_ciphertext = sealed.clone();
        bad_ciphertext.ciphertext[0] ^= 0xFF;
        assert!(open(&key, &bad_ciphertext, b"").is_err());

        let mut bad_nonce = sealed.clone();
        bad_nonce.nonce[0] ^= 0x01;
        assert!(open(&key, &bad_nonce, b"").is_err());

        let mut bad_tag = sealed;
        bad_tag.tag[TAG_SIZE - 1] ^= 0x80;
        assert!(open(&key, &bad_tag, b"").is_err());
    }

    #[test]
    fn test_nonce_is_fresh_per_call() {
        let key = test_key();
        let a = encrypt(&key, b"same", b"").unwrap();
        let b = encrypt(&key, b"same", b"").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_empty_plaintext() {
        let key = test_key();
        let sealed = encrypt(&key, b"", b"").unwrap();
        assert!(open(&key, &sealed, b"").unwrap().is_empty());
    }

    #[test]
    fn test_bad_nonce_length() {
        let key = test_key();
        let sealed = encrypt(&key, b"data", b"").unwrap();
        let result = decrypt(&key, &sealed.ciphertext, &sealed.nonce[..8], &sealed.tag, b"");
        assert!(matches!(result, Err(Error::MalformedEnvelope(_))));
    }
}
