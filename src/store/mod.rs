//! Document store collaborators
//!
//! The orchestrator hands a sealed document to a [`DocumentStore`] as a
//! ciphertext blob plus the envelope's public metadata. Nothing passed across
//! this boundary can reveal the passphrase or the derived key.

mod directory;
mod memory;

pub use directory::DirectoryStore;
pub use memory::MemoryStore;

use crate::envelope::EnvelopeMetadata;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Everything the store receives for one document
#[derive(Debug, Clone)]
pub struct StoreRequest {
    /// Encrypted file contents
    pub ciphertext: Vec<u8>,
    /// MIME type the user's file declared
    pub declared_type: String,
    /// Public envelope fields
    pub metadata: EnvelopeMetadata,
}

/// Confirmation returned by a successful store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreReceipt {
    /// Identifier assigned by the store
    pub id: String,
    /// When the document was accepted
    pub stored_at: DateTime<Utc>,
}

/// A document read back from a store
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: String,
    pub ciphertext: Vec<u8>,
    pub declared_type: String,
    pub metadata: EnvelopeMetadata,
    pub stored_at: DateTime<Utc>,
}

/// Storage backend for sealed documents.
///
/// Timeouts are the implementation's own business; any error, timeouts
/// included, fails the upload attempt.
pub trait DocumentStore: Send + Sync + 'static {
    /// Persist a sealed document and return its identifier
    fn store(&self, request: StoreRequest) -> impl Future<Output = Result<StoreReceipt>> + Send;

    /// Read a sealed document back
    fn fetch(&self, id: &str) -> impl Future<Output = Result<StoredDocument>> + Send;
}
