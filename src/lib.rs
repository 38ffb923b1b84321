//! paperseal - Client-side document sealing
//!
//! Encrypts a sensitive file under a freshly generated passphrase before it
//! leaves the device, then hands the ciphertext and its public envelope to a
//! document store.
//!
//! Pipeline for one file:
//! ```text
//! validate -> generate passphrase -> (user confirms) -> Argon2id -> AES-256-GCM
//!          -> build envelope -> store
//! ```

pub mod config;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod session;
pub mod store;
pub mod validate;

pub use config::Config;
pub use error::{Error, ErrorKind, Result, SessionError, ValidationError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::envelope::{EncryptionEnvelope, EnvelopeMetadata};
    pub use crate::error::{Error, ErrorKind, Result, SessionError, ValidationError};
    pub use crate::session::{SessionSnapshot, SessionState, UploadOrchestrator};
    pub use crate::store::{DirectoryStore, DocumentStore, MemoryStore};
    pub use crate::validate::{SelectedFile, Validator};
}
