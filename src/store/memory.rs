//! In-process document store

use super::{DocumentStore, StoreReceipt, StoreRequest, StoredDocument};
use crate::error::{Error, Result};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Document store backed by a map
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, StoredDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Synchronous lookup
    pub fn get(&self, id: &str) -> Option<StoredDocument> {
        self.documents.read().get(id).cloned()
    }
}

impl DocumentStore for MemoryStore {
    async fn store(&self, request: StoreRequest) -> Result<StoreReceipt> {
        let id = Uuid::new_v4().to_string();
        let stored_at = Utc::now();

        debug!(
            "Storing document {} ({} bytes) in memory",
            id,
            request.ciphertext.len()
        );

        self.documents.write().insert(
            id.clone(),
            StoredDocument {
                id: id.clone(),
                ciphertext: request.ciphertext,
                declared_type: request.declared_type,
                metadata: request.metadata,
                stored_at,
            },
        );

        Ok(StoreReceipt { id, stored_at })
    }

    async fn fetch(&self, id: &str) -> Result<StoredDocument> {
        self.get(id)
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))
    }
}
