//! Async driver for one upload session
//!
//! Selection, upload requests, removal and retries are immediate. `confirm`
//! starts the single pipeline task: key derivation and encryption run on the
//! blocking pool, the store handoff on the runtime, and every state change is
//! published on a watch channel so the caller can keep rendering.

use super::{PassphraseDisclosure, SealJob, SessionSnapshot, SessionState, UploadSession};
use crate::config::{Config, EncryptionConfig};
use crate::crypto::PassphraseGenerator;
use crate::envelope;
use crate::error::{Error, SessionError};
use crate::store::{DocumentStore, StoreRequest};
use crate::validate::{FileType, SelectedFile, Validator};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type SessionResult<T> = std::result::Result<T, SessionError>;

/// Session plus the channel its snapshots are published on
struct Shared {
    session: Mutex<UploadSession>,
    updates: watch::Sender<SessionSnapshot>,
}

impl Shared {
    /// Mutate the session and publish the resulting snapshot
    fn update<T>(&self, f: impl FnOnce(&mut UploadSession) -> T) -> T {
        let mut session = self.session.lock();
        let out = f(&mut session);
        self.updates.send_replace(session.snapshot());
        out
    }
}

/// Drives one [`UploadSession`] against a [`DocumentStore`]
pub struct UploadOrchestrator<S: DocumentStore> {
    shared: Arc<Shared>,
    store: Arc<S>,
    validator: Validator,
    generator: PassphraseGenerator,
    kdf: EncryptionConfig,
    success_display: Duration,
}

impl<S: DocumentStore> UploadOrchestrator<S> {
    /// Create an orchestrator with a fresh idle session
    pub fn new(store: Arc<S>, config: &Config) -> crate::Result<Self> {
        config.validate()?;

        let session = UploadSession::new();
        let (updates, _) = watch::channel(session.snapshot());

        Ok(UploadOrchestrator {
            shared: Arc::new(Shared {
                session: Mutex::new(session),
                updates,
            }),
            store,
            validator: Validator::new(config.upload.max_file_size),
            generator: PassphraseGenerator::from_config(&config.passphrase)?,
            kdf: config.encryption,
            success_display: Duration::from_secs(config.upload.success_display_secs),
        })
    }

    /// Override the success display window
    pub fn with_success_display(mut self, window: Duration) -> Self {
        self.success_display = window;
        self
    }

    /// Receive a snapshot after every transition
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.updates.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.session.lock().snapshot()
    }

    pub fn state(&self) -> SessionState {
        self.shared.session.lock().state()
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Select a file; rejected files move the session to Error
    pub fn select(&self, file: SelectedFile) -> SessionResult<FileType> {
        debug!(
            "Selecting {} ({} bytes, {})",
            file.name(),
            file.size(),
            file.declared_type()
        );

        let result = self
            .shared
            .update(|session| session.select(file, &self.validator));

        match &result {
            Ok(file_type) => info!("File accepted as {}", file_type),
            Err(e) => info!("File rejected: {}", e),
        }
        result.map_err(SessionError::from)
    }

    /// Generate the passphrase and return it for display.
    ///
    /// This is the only time the passphrase text leaves the session. The
    /// pipeline does not continue until [`confirm`](Self::confirm).
    pub fn request_upload(&self) -> SessionResult<PassphraseDisclosure> {
        let length = self.generator.default_length();
        let result = self
            .shared
            .update(|session| session.request_upload(&self.generator, length));

        match &result {
            Ok(_) => info!("Passphrase generated, waiting for confirmation"),
            Err(e) => warn!("Could not start upload: {}", e),
        }
        result.map_err(SessionError::from)
    }

    /// The user saved the passphrase: start encrypting and uploading.
    ///
    /// Returns the handle of the pipeline task; it completes when the
    /// session reaches Success or Error.
    pub fn confirm(&self) -> SessionResult<JoinHandle<()>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SessionError::from(Error::Internal(e.to_string())))?;

        let job = self
            .shared
            .update(|session| session.confirm())
            .map_err(SessionError::from)?;

        info!("Starting pipeline attempt {}", job.attempt);

        let pipeline = Pipeline {
            shared: Arc::clone(&self.shared),
            store: Arc::clone(&self.store),
            kdf: self.kdf,
            success_display: self.success_display,
        };
        Ok(runtime.spawn(pipeline.run(job)))
    }

    /// Drop the file and any passphrase; not possible while busy
    pub fn remove(&self) -> SessionResult<()> {
        self.shared
            .update(|session| session.remove())
            .map_err(SessionError::from)?;
        info!("File removed, session idle");
        Ok(())
    }

    /// Return to FileSelected after a failed attempt
    pub fn retry(&self) -> SessionResult<()> {
        self.shared
            .update(|session| session.retry())
            .map_err(SessionError::from)?;
        info!("Retrying with the preserved file");
        Ok(())
    }

    /// Wait until the current attempt has finished
    pub async fn settled(&self) -> SessionSnapshot {
        let mut updates = self.subscribe();
        let result = updates
            .wait_for(|snapshot| !snapshot.state.is_busy())
            .await
            .map(|snapshot| snapshot.clone());
        result.unwrap_or_else(|_| self.snapshot())
    }
}

/// Everything the spawned pipeline task needs
struct Pipeline<S: DocumentStore> {
    shared: Arc<Shared>,
    store: Arc<S>,
    kdf: EncryptionConfig,
    success_display: Duration,
}

impl<S: DocumentStore> Pipeline<S> {
    async fn run(self, job: SealJob) {
        let SealJob {
            attempt,
            file,
            passphrase,
        } = job;
        let declared_type = file.declared_type().to_string();
        let kdf = self.kdf;

        // Derivation must finish before encryption; both are CPU-bound.
        let sealed = tokio::task::spawn_blocking(move || {
            let result = envelope::seal(&file, &passphrase, &kdf);
            drop(passphrase);
            result
        })
        .await
        .map_err(|e| Error::Encryption(format!("Encryption task failed: {}", e)))
        .and_then(|result| result);

        let envelope = match sealed {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Encryption failed on attempt {}: {}", attempt, e);
                self.record_failure(attempt, &e);
                return;
            }
        };

        if let Err(e) = self.shared.update(|session| session.encrypted(attempt)) {
            warn!("Dropping sealed document: {}", e);
            return;
        }
        debug!("Attempt {} encrypted, uploading", attempt);

        let (ciphertext, metadata) = envelope.into_parts();
        let request = StoreRequest {
            ciphertext,
            declared_type,
            metadata,
        };

        match self.store.store(request).await {
            Ok(receipt) => {
                info!("Upload complete: document {}", receipt.id);
                if let Err(e) = self
                    .shared
                    .update(|session| session.stored(attempt, receipt))
                {
                    warn!("Could not record upload: {}", e);
                    return;
                }
                self.schedule_reset(attempt);
            }
            Err(e) => {
                warn!("Document store failed on attempt {}: {}", attempt, e);
                self.record_failure(attempt, &e);
            }
        }
    }

    fn record_failure(&self, attempt: u64, err: &Error) {
        if let Err(e) = self.shared.update(|session| session.fail(attempt, err)) {
            warn!("Could not record failure: {}", e);
        }
    }

    /// Return to Idle once the success display window has passed
    fn schedule_reset(&self, attempt: u64) {
        let shared = Arc::clone(&self.shared);
        let window = self.success_display;

        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if shared.update(|session| session.display_elapsed(attempt)) {
                debug!("Success window for attempt {} elapsed, session idle", attempt);
            }
        });
    }
}
