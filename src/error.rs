//! Error types for paperseal

use serde::Serialize;
use std::fmt;
use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Reasons the validator refuses a file
///
/// Detected before any cryptographic work, so every variant is recoverable
/// by picking a different file.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("File too large: {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("Unsupported file type: {declared}")]
    UnsupportedType { declared: String },

    #[error("Files with the .{extension} extension are not allowed")]
    DangerousExtension { extension: String },
}

/// Main error type for paperseal
#[derive(Error, Debug)]
pub enum Error {
    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    // Crypto errors
    #[error("Passphrase generation error: {0}")]
    Passphrase(String),

    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Authentication failed: data was tampered with or the passphrase is wrong")]
    AuthenticationFailed,

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    // Document store errors
    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Document store timed out after {seconds} seconds")]
    StoreTimeout { seconds: u64 },

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    // Session errors
    #[error("Cannot {action} while the session is {state}")]
    InvalidTransition { state: String, action: String },

    #[error("{0}")]
    Session(SessionError),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable error category surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Crypto,
    Upload,
    InvalidState,
    Config,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Crypto => "crypto",
            ErrorKind::Upload => "upload",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Config => "config",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Stable category for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Passphrase(_)
            | Error::KeyDerivation(_)
            | Error::Encryption(_)
            | Error::AuthenticationFailed
            | Error::MalformedEnvelope(_) => ErrorKind::Crypto,
            Error::Upload(_) | Error::StoreTimeout { .. } | Error::DocumentNotFound(_) => {
                ErrorKind::Upload
            }
            Error::InvalidTransition { .. } => ErrorKind::InvalidState,
            Error::Session(e) => e.kind,
            Error::Config(_) | Error::InvalidConfig(_) => ErrorKind::Config,
            Error::Io(_) | Error::Serialization(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to show an end user.
    ///
    /// Crypto and upload failures collapse to fixed text so that neither
    /// cryptographic state nor raw backend errors reach the UI.
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation(e) => e.to_string(),
            Error::AuthenticationFailed => {
                "The document could not be decrypted. Check the passphrase and try again."
                    .to_string()
            }
            Error::InvalidTransition { .. } => self.to_string(),
            Error::Session(e) => e.message.clone(),
            Error::Config(_) | Error::InvalidConfig(_) => self.to_string(),
            _ => match self.kind() {
                ErrorKind::Crypto => {
                    "Encryption failed. Please try again.".to_string()
                }
                ErrorKind::Upload => {
                    "Upload failed. Please try again.".to_string()
                }
                _ => "Something went wrong. Please try again.".to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Tagged error value reported by an upload session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionError {
    /// Stable category
    pub kind: ErrorKind,
    /// User-safe message
    pub message: String,
    /// Present when the file was refused by the validator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationError>,
}

impl SessionError {
    /// Whether re-running the pipeline with the same file may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Crypto | ErrorKind::Upload)
    }
}

impl From<&Error> for SessionError {
    fn from(e: &Error) -> Self {
        let validation = match e {
            Error::Validation(v) => Some(v.clone()),
            Error::Session(inner) => return inner.clone(),
            _ => None,
        };
        SessionError {
            kind: e.kind(),
            message: e.user_message(),
            validation,
        }
    }
}

impl From<Error> for SessionError {
    fn from(e: Error) -> Self {
        SessionError::from(&e)
    }
}

impl From<SessionError> for Error {
    fn from(e: SessionError) -> Self {
        Error::Session(e)
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

impl std::error::Error for SessionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_message_hides_backend_detail() {
        let err = Error::Upload("s3: 403 AccessDenied bucket=tax-docs".to_string());
        let session: SessionError = err.into();

        assert_eq!(session.kind, ErrorKind::Upload);
        assert!(!session.message.contains("AccessDenied"));
        assert!(!session.message.contains("tax-docs"));
        assert!(session.is_retryable());
    }

    #[test]
    fn test_crypto_message_hides_detail() {
        let err = Error::KeyDerivation("memory cost 12 below minimum".to_string());
        let session = SessionError::from(&err);

        assert_eq!(session.kind, ErrorKind::Crypto);
        assert!(!session.message.contains("memory cost"));
    }

    #[test]
    fn test_validation_error_is_carried() {
        let err = Error::from(ValidationError::UnsupportedType {
            declared: "text/plain".to_string(),
        });
        let session = SessionError::from(&err);

        assert_eq!(session.kind, ErrorKind::Validation);
        assert!(matches!(
            session.validation,
            Some(ValidationError::UnsupportedType { .. })
        ));
        assert!(!session.is_retryable());
    }

    #[test]
    fn test_session_error_serializes_kind() {
        let session = SessionError::from(Error::StoreTimeout { seconds: 30 });
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"kind\":\"upload\""));
        assert!(!json.contains("validation"));
    }
}
