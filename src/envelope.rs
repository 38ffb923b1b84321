//! Encryption envelope
//!
//! The envelope is everything needed to decrypt a document later except the
//! passphrase: ciphertext, tag, salt, nonce, the KDF work factor and the
//! original file's name, size and type. The builder's input type has no
//! field that could carry a passphrase or a key.

use crate::config::EncryptionConfig;
use crate::crypto::{
    decrypt, derive_key, encrypt, generate_salt, Passphrase, NONCE_SIZE, SALT_SIZE, TAG_SIZE,
};
use crate::error::{Error, Result};
use crate::validate::SelectedFile;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Current envelope format version
pub const ENVELOPE_VERSION: u32 = 1;

/// Original file details recorded alongside the ciphertext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
}

impl DocumentInfo {
    pub fn from_file(file: &SelectedFile) -> Self {
        DocumentInfo {
            name: file.name().to_string(),
            size: file.size(),
            mime_type: file.declared_type().to_string(),
        }
    }

    /// Associated data binding the file details to the ciphertext
    fn associated_data(&self, version: u32) -> Vec<u8> {
        let mut aad = Vec::with_capacity(24 + self.name.len() + self.mime_type.len());
        aad.extend_from_slice(&version.to_be_bytes());
        aad.extend_from_slice(&(self.name.len() as u32).to_be_bytes());
        aad.extend_from_slice(self.name.as_bytes());
        aad.extend_from_slice(&self.size.to_be_bytes());
        aad.extend_from_slice(&(self.mime_type.len() as u32).to_be_bytes());
        aad.extend_from_slice(self.mime_type.as_bytes());
        aad
    }
}

/// Builder input: public encryption outputs only
#[derive(Debug)]
pub struct EnvelopeParts {
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_SIZE],
    pub nonce: [u8; NONCE_SIZE],
    pub salt: [u8; SALT_SIZE],
    pub kdf: EncryptionConfig,
    pub document: DocumentInfo,
}

/// Public half of the envelope, stored next to the ciphertext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    /// Envelope format version
    pub version: u32,

    /// Argon2id salt
    #[serde(with = "hex_bytes")]
    pub salt: [u8; SALT_SIZE],

    /// AES-GCM nonce
    #[serde(with = "hex_bytes")]
    pub nonce: [u8; NONCE_SIZE],

    /// AES-GCM authentication tag
    #[serde(with = "hex_bytes")]
    pub tag: [u8; TAG_SIZE],

    /// Work factor used to derive the key
    pub kdf: EncryptionConfig,

    pub original_name: String,
    pub original_size: u64,
    pub original_type: String,
}

impl EnvelopeMetadata {
    pub fn document(&self) -> DocumentInfo {
        DocumentInfo {
            name: self.original_name.clone(),
            size: self.original_size,
            mime_type: self.original_type.clone(),
        }
    }
}

/// Ciphertext plus its public metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionEnvelope {
    ciphertext: Vec<u8>,
    metadata: EnvelopeMetadata,
}

impl EncryptionEnvelope {
    /// Assemble an envelope from encryption outputs
    pub fn build(parts: EnvelopeParts) -> Self {
        let EnvelopeParts {
            ciphertext,
            tag,
            nonce,
            salt,
            kdf,
            document,
        } = parts;

        EncryptionEnvelope {
            ciphertext,
            metadata: EnvelopeMetadata {
                version: ENVELOPE_VERSION,
                salt,
                nonce,
                tag,
                kdf,
                original_name: document.name,
                original_size: document.size,
                original_type: document.mime_type,
            },
        }
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn metadata(&self) -> &EnvelopeMetadata {
        &self.metadata
    }

    /// Split into the ciphertext blob and its metadata
    pub fn into_parts(self) -> (Vec<u8>, EnvelopeMetadata) {
        (self.ciphertext, self.metadata)
    }
}

/// Derive a key with a fresh salt, encrypt the file and build its envelope.
///
/// The derived key is dropped (and wiped) before this returns.
pub fn seal(
    file: &SelectedFile,
    passphrase: &Passphrase,
    kdf: &EncryptionConfig,
) -> Result<EncryptionEnvelope> {
    let salt = generate_salt();
    let document = DocumentInfo::from_file(file);

    let sealed = {
        let key = derive_key(passphrase, &salt, kdf)?;
        encrypt(
            key.key(),
            file.bytes(),
            &document.associated_data(ENVELOPE_VERSION),
        )?
    };

    debug!(
        "Sealed {} bytes for {}",
        sealed.ciphertext.len(),
        document.name
    );

    Ok(EncryptionEnvelope::build(EnvelopeParts {
        ciphertext: sealed.ciphertext,
        tag: sealed.tag,
        nonce: sealed.nonce,
        salt,
        kdf: *kdf,
        document,
    }))
}

/// Recover the plaintext of a sealed document
pub fn open(
    ciphertext: &[u8],
    metadata: &EnvelopeMetadata,
    passphrase: &Passphrase,
) -> Result<Vec<u8>> {
    if metadata.version != ENVELOPE_VERSION {
        return Err(Error::MalformedEnvelope(format!(
            "Unsupported envelope version: {}",
            metadata.version
        )));
    }

    if ciphertext.len() as u64 != metadata.original_size {
        return Err(Error::MalformedEnvelope(format!(
            "Ciphertext is {} bytes but the envelope records {}",
            ciphertext.len(),
            metadata.original_size
        )));
    }

    // The work factor comes from storage; bound it before Argon2 allocates.
    metadata.kdf.validate().map_err(|e| {
        Error::MalformedEnvelope(format!("Unacceptable key derivation parameters: {}", e))
    })?;

    let key = derive_key(passphrase, &metadata.salt, &metadata.kdf)?;
    decrypt(
        key.key(),
        ciphertext,
        &metadata.nonce,
        &metadata.tag,
        &metadata.document().associated_data(metadata.version),
    )
}

/// Hex serialization for fixed-size byte arrays
mod hex_bytes {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(de::Error::custom)?;
        let len = bytes.len();
        bytes
            .try_into()
            .map_err(|_| de::Error::custom(format!("expected {} bytes, got {}", N, len)))
    }
}
