//! Upload sessions
//!
//! An [`UploadSession`] is a plain value holding one file's journey through
//! the pipeline. Every mutation goes through the pure [`transition`]
//! function, so an event that is not allowed in the current state leaves the
//! session untouched. [`UploadOrchestrator`] owns one session and drives the
//! long-running steps on the async runtime.

mod machine;
mod orchestrator;

pub use machine::{transition, SessionEvent, SessionState};
pub use orchestrator::UploadOrchestrator;

use crate::crypto::{Passphrase, PassphraseGenerator};
use crate::error::{Error, Result, SessionError};
use crate::store::StoreReceipt;
use crate::validate::{FileType, SelectedFile, Validator};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use zeroize::Zeroizing;

/// Non-secret description of the selected file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub name: String,
    pub size: u64,
    pub declared_type: String,
}

impl From<&SelectedFile> for FileSummary {
    fn from(file: &SelectedFile) -> Self {
        FileSummary {
            name: file.name().to_string(),
            size: file.size(),
            declared_type: file.declared_type().to_string(),
        }
    }
}

/// Observable view of a session. Contains no secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// Number of pipeline runs started so far
    pub attempt: u64,
    pub file: Option<FileSummary>,
    pub error: Option<SessionError>,
    pub receipt: Option<StoreReceipt>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        UploadSession::new().snapshot()
    }
}

/// The passphrase text, handed out once when an upload is requested.
///
/// Wiped when dropped.
pub struct PassphraseDisclosure {
    text: Zeroizing<String>,
}

impl PassphraseDisclosure {
    /// Passphrase to display and let the user copy
    pub fn expose(&self) -> &str {
        &self.text
    }
}

impl fmt::Debug for PassphraseDisclosure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassphraseDisclosure")
            .field("text", &"[REDACTED]")
            .finish()
    }
}

/// Work handed to the encryption step when the user confirms
#[derive(Debug)]
pub struct SealJob {
    pub attempt: u64,
    pub file: Arc<SelectedFile>,
    pub passphrase: Passphrase,
}

/// State of one file upload
#[derive(Debug)]
pub struct UploadSession {
    state: SessionState,
    file: Option<Arc<SelectedFile>>,
    summary: Option<FileSummary>,
    passphrase: Option<Passphrase>,
    error: Option<SessionError>,
    receipt: Option<StoreReceipt>,
    attempt: u64,
}

impl Default for UploadSession {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadSession {
    pub fn new() -> Self {
        UploadSession {
            state: SessionState::Idle,
            file: None,
            summary: None,
            passphrase: None,
            error: None,
            receipt: None,
            attempt: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn file(&self) -> Option<&SelectedFile> {
        self.file.as_deref()
    }

    pub fn error(&self) -> Option<&SessionError> {
        self.error.as_ref()
    }

    pub fn receipt(&self) -> Option<&StoreReceipt> {
        self.receipt.as_ref()
    }

    /// Whether a passphrase is currently held
    pub fn holds_passphrase(&self) -> bool {
        self.passphrase.is_some()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            attempt: self.attempt,
            file: self.summary.clone(),
            error: self.error.clone(),
            receipt: self.receipt.clone(),
        }
    }

    /// Resolve the target state for `event` or refuse it
    fn next(&self, event: SessionEvent) -> Result<SessionState> {
        transition(self.state, event).ok_or_else(|| Error::InvalidTransition {
            state: self.state.to_string(),
            action: event.action().to_string(),
        })
    }

    fn check_attempt(&self, attempt: u64) -> Result<()> {
        if attempt != self.attempt {
            return Err(Error::Internal(format!(
                "Stale pipeline attempt {} (current {})",
                attempt, self.attempt
            )));
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.file = None;
        self.summary = None;
        self.passphrase = None;
        self.error = None;
        self.receipt = None;
    }

    /// Validate and take ownership of a file
    pub fn select(&mut self, file: SelectedFile, validator: &Validator) -> Result<FileType> {
        // Accepted and rejected files share the same source states.
        self.next(SessionEvent::FileAccepted)?;

        match validator.validate(&file) {
            Ok(file_type) => {
                self.clear();
                self.summary = Some(FileSummary::from(&file));
                self.file = Some(Arc::new(file));
                self.state = self.next(SessionEvent::FileAccepted)?;
                Ok(file_type)
            }
            Err(rejection) => {
                let err = Error::Validation(rejection);
                self.clear();
                self.error = Some(SessionError::from(&err));
                self.state = self.next(SessionEvent::FileRejected)?;
                Err(err)
            }
        }
    }

    /// Generate a passphrase and return it for display
    pub fn request_upload(
        &mut self,
        generator: &PassphraseGenerator,
        length: usize,
    ) -> Result<PassphraseDisclosure> {
        let target = self.next(SessionEvent::RequestUpload)?;

        match generator.generate(length) {
            Ok(passphrase) => {
                let text = Zeroizing::new(passphrase.expose().to_string());
                self.passphrase = Some(passphrase);
                self.state = target;
                Ok(PassphraseDisclosure { text })
            }
            Err(err) => {
                self.fail_now(&err)?;
                Err(err)
            }
        }
    }

    /// Acknowledge the passphrase and hand the work to the encryption step.
    ///
    /// The passphrase moves into the job; the session no longer holds it.
    pub fn confirm(&mut self) -> Result<SealJob> {
        let target = self.next(SessionEvent::Confirm)?;

        let file = self
            .file
            .clone()
            .ok_or_else(|| Error::Internal("No file selected".to_string()))?;
        let passphrase = self
            .passphrase
            .take()
            .ok_or_else(|| Error::Internal("No passphrase generated".to_string()))?;

        self.attempt += 1;
        self.state = target;

        Ok(SealJob {
            attempt: self.attempt,
            file,
            passphrase,
        })
    }

    /// The envelope for `attempt` is ready
    pub fn encrypted(&mut self, attempt: u64) -> Result<()> {
        self.check_attempt(attempt)?;
        self.state = self.next(SessionEvent::Encrypted)?;
        Ok(())
    }

    /// The store accepted the upload for `attempt`; the file is released
    pub fn stored(&mut self, attempt: u64, receipt: StoreReceipt) -> Result<()> {
        self.check_attempt(attempt)?;
        self.state = self.next(SessionEvent::Stored)?;
        self.file = None;
        self.passphrase = None;
        self.receipt = Some(receipt);
        Ok(())
    }

    /// The pipeline run `attempt` failed
    pub fn fail(&mut self, attempt: u64, err: &Error) -> Result<()> {
        self.check_attempt(attempt)?;
        self.fail_now(err)
    }

    /// Move to Error, keeping the file and wiping the passphrase
    fn fail_now(&mut self, err: &Error) -> Result<()> {
        self.state = self.next(SessionEvent::Failed)?;
        self.passphrase = None;
        self.error = Some(SessionError::from(err));
        Ok(())
    }

    /// Drop the file, passphrase and error
    pub fn remove(&mut self) -> Result<()> {
        self.state = self.next(SessionEvent::Remove)?;
        self.clear();
        Ok(())
    }

    /// Go back to FileSelected with the preserved file
    pub fn retry(&mut self) -> Result<()> {
        let target = self.next(SessionEvent::Retry)?;
        if self.file.is_none() {
            return Err(Error::InvalidTransition {
                state: self.state.to_string(),
                action: "retry without a file".to_string(),
            });
        }
        self.state = target;
        self.error = None;
        Ok(())
    }

    /// Reset after the success display window; ignored unless the session is
    /// still showing the success of `attempt`
    pub fn display_elapsed(&mut self, attempt: u64) -> bool {
        if self.attempt != attempt {
            return false;
        }
        match self.next(SessionEvent::DisplayElapsed) {
            Ok(target) => {
                self.state = target;
                self.clear();
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, ValidationError};
    use chrono::Utc;

    fn pdf() -> SelectedFile {
        SelectedFile::new("w2.pdf", "application/pdf", b"%PDF".to_vec())
    }

    fn receipt() -> StoreReceipt {
        StoreReceipt {
            id: "doc-1".to_string(),
            stored_at: Utc::now(),
        }
    }

    fn disclosed() -> (UploadSession, PassphraseDisclosure) {
        let mut session = UploadSession::new();
        session.select(pdf(), &Validator::default()).unwrap();
        let disclosure = session
            .request_upload(&PassphraseGenerator::default(), 24)
            .unwrap();
        (session, disclosure)
    }

    #[test]
    fn test_full_lifecycle() {
        let (mut session, disclosure) = disclosed();
        assert_eq!(session.state(), SessionState::PassphraseDisclosed);
        assert_eq!(disclosure.expose().len(), 24);
        assert!(session.holds_passphrase());

        let job = session.confirm().unwrap();
        assert_eq!(job.attempt, 1);
        assert_eq!(job.passphrase.expose(), disclosure.expose());
        assert!(!session.holds_passphrase());
        assert_eq!(session.state(), SessionState::Encrypting);

        session.encrypted(1).unwrap();
        assert_eq!(session.state(), SessionState::Uploading);

        session.stored(1, receipt()).unwrap();
        assert_eq!(session.state(), SessionState::Success);
        assert!(session.file().is_none());
        assert_eq!(session.snapshot().file.unwrap().name, "w2.pdf");
        assert_eq!(session.receipt().unwrap().id, "doc-1");

        assert!(session.display_elapsed(1));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.snapshot().file, None);
    }

    #[test]
    fn test_rejected_file_is_discarded() {
        let mut session = UploadSession::new();
        let bad = SelectedFile::new("notes.txt", "text/plain", b"hi".to_vec());

        let err = session.select(bad, &Validator::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::UnsupportedType { .. })
        ));
        assert_eq!(session.state(), SessionState::Error);
        assert!(session.file().is_none());
        assert_eq!(session.error().unwrap().kind, ErrorKind::Validation);

        // Nothing to retry with
        assert!(session.retry().is_err());

        // A new selection recovers
        session.select(pdf(), &Validator::default()).unwrap();
        assert_eq!(session.state(), SessionState::FileSelected);
        assert!(session.error().is_none());
    }

    #[test]
    fn test_remove_wipes_passphrase() {
        let (mut session, _disclosure) = disclosed();
        session.remove().unwrap();

        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.holds_passphrase());
        assert!(session.file().is_none());
        assert!(matches!(
            session.confirm(),
            Err(Error::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_failure_keeps_file_and_drops_passphrase() {
        let (mut session, _disclosure) = disclosed();
        let job = session.confirm().unwrap();
        session.encrypted(job.attempt).unwrap();

        session
            .fail(job.attempt, &Error::Upload("connection reset".to_string()))
            .unwrap();

        assert_eq!(session.state(), SessionState::Error);
        assert!(session.file().is_some());
        assert!(!session.holds_passphrase());
        let error = session.error().unwrap();
        assert_eq!(error.kind, ErrorKind::Upload);
        assert!(!error.message.contains("connection reset"));

        session.retry().unwrap();
        assert_eq!(session.state(), SessionState::FileSelected);
        assert!(session.error().is_none());
    }

    #[test]
    fn test_busy_session_refuses_remove() {
        let (mut session, _disclosure) = disclosed();
        session.confirm().unwrap();

        assert!(matches!(
            session.remove(),
            Err(Error::InvalidTransition { .. })
        ));
        assert_eq!(session.state(), SessionState::Encrypting);
    }

    #[test]
    fn test_stale_attempt_ignored() {
        let (mut session, _disclosure) = disclosed();
        let job = session.confirm().unwrap();

        assert!(session.encrypted(job.attempt + 1).is_err());
        assert_eq!(session.state(), SessionState::Encrypting);

        session.encrypted(job.attempt).unwrap();
        session.stored(job.attempt, receipt()).unwrap();
        assert!(!session.display_elapsed(job.attempt + 1));
        assert_eq!(session.state(), SessionState::Success);
    }

    #[test]
    fn test_success_only_allows_remove() {
        let (mut session, _disclosure) = disclosed();
        let job = session.confirm().unwrap();
        session.encrypted(job.attempt).unwrap();
        session.stored(job.attempt, receipt()).unwrap();

        assert!(session.select(pdf(), &Validator::default()).is_err());
        assert_eq!(session.state(), SessionState::Success);

        session.remove().unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.display_elapsed(job.attempt));
    }

    #[test]
    fn test_invalid_transition_leaves_state() {
        let mut session = UploadSession::new();
        assert!(session
            .request_upload(&PassphraseGenerator::default(), 24)
            .is_err());
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.error().is_none());
    }

    #[test]
    fn test_passphrase_generation_failure() {
        let mut session = UploadSession::new();
        session.select(pdf(), &Validator::default()).unwrap();

        let err = session
            .request_upload(&PassphraseGenerator::default(), 0)
            .unwrap_err();
        assert!(matches!(err, Error::Passphrase(_)));
        assert_eq!(session.state(), SessionState::Error);
        assert_eq!(session.error().unwrap().kind, ErrorKind::Crypto);
        assert!(session.file().is_some());
    }

    #[test]
    fn test_disclosure_debug_is_redacted() {
        let (_session, disclosure) = disclosed();
        let debug = format!("{:?}", disclosure);
        assert!(!debug.contains(disclosure.expose()));
    }
}
