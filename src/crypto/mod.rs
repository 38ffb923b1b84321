//! Cryptography module for paperseal
//!
//! Provides passphrase generation, Argon2id key derivation and AES-256-GCM
//! encryption. Every encryption draws a fresh salt and nonce, so a
//! (key, nonce) pair is never reused even when the passphrase repeats.

mod encryption;
mod kdf;
mod passphrase;

pub use encryption::{decrypt, encrypt, SealedData};
pub use kdf::{derive_key, generate_salt, DerivedKey};
pub use passphrase::{Passphrase, PassphraseGenerator};

/// Size of AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of GCM nonce in bytes
pub const NONCE_SIZE: usize = 12;

/// Size of GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Size of salt for key derivation
pub const SALT_SIZE: usize = 32;
