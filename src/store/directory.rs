//! Directory-backed document store
//!
//! Layout:
//! ```text
//! <dir>/<id>.bin   ciphertext
//! <dir>/<id>.json  record: declared type, envelope metadata, checksum
//! ```

use super::{DocumentStore, StoreReceipt, StoreRequest, StoredDocument};
use crate::config::StoreConfig;
use crate::envelope::EnvelopeMetadata;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// On-disk record written next to each ciphertext blob
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    id: String,
    declared_type: String,
    metadata: EnvelopeMetadata,
    stored_at: DateTime<Utc>,
    /// BLAKE3 of the ciphertext
    checksum: String,
    size: u64,
}

/// Document store writing to a local directory
pub struct DirectoryStore {
    root: PathBuf,
    timeout: Duration,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        DirectoryStore {
            root: root.into(),
            timeout,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(
            config.directory.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn blob_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.bin", id))
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.json", id))
    }

    async fn with_timeout<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| Error::StoreTimeout {
                seconds: self.timeout.as_secs(),
            })?
    }

    async fn write(&self, request: StoreRequest) -> Result<StoreReceipt> {
        let id = Uuid::new_v4().to_string();
        self.write_as(&id, request).await
    }

    async fn write_as(&self, id: &str, request: StoreRequest) -> Result<StoreReceipt> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Error::Upload(format!("Failed to create store directory: {}", e)))?;

        let stored_at = Utc::now();
        let record = StoredRecord {
            id: id.to_string(),
            declared_type: request.declared_type,
            metadata: request.metadata,
            stored_at,
            checksum: blake3::hash(&request.ciphertext).to_hex().to_string(),
            size: request.ciphertext.len() as u64,
        };
        let record_json = serde_json::to_vec_pretty(&record)?;

        let mut pending = PendingFiles::default();

        // Blob first, record last: a record only exists for a complete blob.
        let blob_path = self.blob_path(id);
        let tmp_path = blob_path.with_extension("bin.tmp");
        pending.track(tmp_path.clone());
        tokio::fs::write(&tmp_path, &request.ciphertext)
            .await
            .map_err(|e| Error::Upload(format!("Failed to write ciphertext: {}", e)))?;

        pending.track(blob_path.clone());
        tokio::fs::rename(&tmp_path, &blob_path)
            .await
            .map_err(|e| Error::Upload(format!("Failed to finalize ciphertext: {}", e)))?;

        let record_path = self.record_path(id);
        pending.track(record_path.clone());
        tokio::fs::write(&record_path, record_json)
            .await
            .map_err(|e| Error::Upload(format!("Failed to write record: {}", e)))?;

        pending.commit();
        info!("Stored document {} ({} bytes)", id, record.size);
        Ok(StoreReceipt {
            id: id.to_string(),
            stored_at,
        })
    }

    async fn read(&self, id: &str) -> Result<StoredDocument> {
        // Ids are UUIDs; anything else could name a path outside the store.
        if Uuid::parse_str(id).is_err() {
            return Err(Error::DocumentNotFound(id.to_string()));
        }

        let record_bytes = match tokio::fs::read(self.record_path(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::DocumentNotFound(id.to_string()));
            }
            Err(e) => return Err(Error::Io(e)),
        };
        let record: StoredRecord = serde_json::from_slice(&record_bytes)?;

        let ciphertext = tokio::fs::read(self.blob_path(id)).await?;
        let checksum = blake3::hash(&ciphertext).to_hex().to_string();
        if checksum != record.checksum {
            return Err(Error::MalformedEnvelope(format!(
                "Checksum mismatch for document {}",
                id
            )));
        }

        debug!("Read document {} ({} bytes)", id, ciphertext.len());
        Ok(StoredDocument {
            id: record.id,
            ciphertext,
            declared_type: record.declared_type,
            metadata: record.metadata,
            stored_at: record.stored_at,
        })
    }
}

/// Files of a document still being written.
///
/// Removed on drop unless committed, so an error or a write cancelled by
/// the store timeout leaves nothing behind.
#[derive(Default)]
struct PendingFiles {
    paths: Vec<PathBuf>,
}

impl PendingFiles {
    fn track(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    fn commit(mut self) {
        self.paths.clear();
    }
}

impl Drop for PendingFiles {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("Removed partial file {:?}", path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove partial file {:?}: {}", path, e),
            }
        }
    }
}

impl DocumentStore for DirectoryStore {
    async fn store(&self, request: StoreRequest) -> Result<StoreReceipt> {
        self.with_timeout(self.write(request)).await
    }

    async fn fetch(&self, id: &str) -> Result<StoredDocument> {
        self.with_timeout(self.read(id)).await
    }
}
