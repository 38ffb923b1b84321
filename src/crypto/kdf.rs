//! Argon2id key derivation
//!
//! Turns a passphrase and a per-encryption salt into an AES-256 key.
//! Deterministic in (passphrase, salt, parameters).

use crate::config::EncryptionConfig;
use crate::crypto::{Passphrase, KEY_SIZE, SALT_SIZE};
use crate::error::{Error, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use zeroize::Zeroizing;

/// Symmetric key derived from a passphrase. Wiped on drop.
pub struct DerivedKey {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl DerivedKey {
    /// Get the raw key bytes
    pub fn key(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Draw a fresh random salt
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive a key from `passphrase` and `salt` with Argon2id
pub fn derive_key(
    passphrase: &Passphrase,
    salt: &[u8],
    config: &EncryptionConfig,
) -> Result<DerivedKey> {
    if passphrase.is_empty() {
        return Err(Error::KeyDerivation("Passphrase is empty".to_string()));
    }

    let params = Params::new(
        config.argon2_memory_kib,
        config.argon2_iterations,
        config.argon2_parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| Error::KeyDerivation(format!("Invalid Argon2 parameters: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    argon2
        .hash_password_into(passphrase.expose().as_bytes(), salt, &mut key[..])
        .map_err(|e| Error::KeyDerivation(format!("Argon2id failed: {}", e)))?;

    Ok(DerivedKey { key })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> EncryptionConfig {
        EncryptionConfig {
            argon2_memory_kib: 1024,
            argon2_iterations: 1,
            argon2_parallelism: 1,
        }
    }

    fn passphrase(s: &str) -> Passphrase {
        Passphrase::from_string(s.to_string())
    }

    #[test]
    fn test_derivation_deterministic() {
        let salt = [7u8; SALT_SIZE];
        let key1 = derive_key(&passphrase("same"), &salt, &test_config()).unwrap();
        let key2 = derive_key(&passphrase("same"), &salt, &test_config()).unwrap();
        assert_eq!(key1.key(), key2.key());
    }

    #[test]
    fn test_different_salts() {
        let key1 = derive_key(&passphrase("same"), &[1u8; SALT_SIZE], &test_config()).unwrap();
        let key2 = derive_key(&passphrase("same"), &[2u8; SALT_SIZE], &test_config()).unwrap();
        assert_ne!(key1.key(), key2.key());
    }

    #[test]
    fn test_different_passphrases() {
        let salt = [1u8; SALT_SIZE];
        let key1 = derive_key(&passphrase("passphrase-a"), &salt, &test_config()).unwrap();
        let key2 = derive_key(&passphrase("passphrase-b"), &salt, &test_config()).unwrap();
        assert_ne!(key1.key(), key2.key());
    }

    #[test]
    fn test_work_factor_changes_key() {
        let salt = [1u8; SALT_SIZE];
        let mut slower = test_config();
        slower.argon2_iterations = 2;

        let key1 = derive_key(&passphrase("same"), &salt, &test_config()).unwrap();
        let key2 = derive_key(&passphrase("same"), &salt, &slower).unwrap();
        assert_ne!(key1.key(), key2.key());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let config = EncryptionConfig {
            argon2_memory_kib: 1,
            argon2_iterations: 1,
            argon2_parallelism: 1,
        };
        let result = derive_key(&passphrase("x"), &[0u8; SALT_SIZE], &config);
        assert!(matches!(result, Err(Error::KeyDerivation(_))));
    }

    #[test]
    fn test_empty_passphrase_rejected() {
        let result = derive_key(&passphrase(""), &[0u8; SALT_SIZE], &test_config());
        assert!(matches!(result, Err(Error::KeyDerivation(_))));
    }

    #[test]
    fn test_salts_are_fresh() {
        assert_ne!(generate_salt(), generate_salt());
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = derive_key(&passphrase("x"), &[0u8; SALT_SIZE], &test_config()).unwrap();
        assert!(format!("{:?}", key).contains("REDACTED"));
    }
}
