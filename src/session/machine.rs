//! Upload session state machine
//!
//! ```text
//! Idle -select-> FileSelected -request-> PassphraseDisclosed -confirm-> Encrypting
//!     -> Uploading -> Success -(display window)-> Idle
//! ```
//!
//! A rejected file or any failure along the way lands in Error; `retry`
//! takes Error back to FileSelected when the file survived.
//! `remove` returns FileSelected, PassphraseDisclosed, Error and Success to
//! Idle. Encrypting and Uploading cannot be interrupted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an upload session currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    FileSelected,
    PassphraseDisclosed,
    Encrypting,
    Uploading,
    Success,
    Error,
}

impl SessionState {
    /// States the pipeline leaves on its own
    pub fn is_busy(&self) -> bool {
        matches!(self, SessionState::Encrypting | SessionState::Uploading)
    }

    /// States that end an attempt
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Success | SessionState::Error)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::FileSelected => "file selected",
            SessionState::PassphraseDisclosed => "waiting for passphrase confirmation",
            SessionState::Encrypting => "encrypting",
            SessionState::Uploading => "uploading",
            SessionState::Success => "complete",
            SessionState::Error => "failed",
        };
        f.write_str(name)
    }
}

/// Discrete inputs that move a session between states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A file passed validation
    FileAccepted,
    /// A file failed validation
    FileRejected,
    /// The user asked to upload the selected file
    RequestUpload,
    /// The user confirmed they saved the passphrase
    Confirm,
    /// The envelope was built
    Encrypted,
    /// The document store accepted the upload
    Stored,
    /// Passphrase generation, derivation, encryption or upload failed
    Failed,
    /// The user removed the file
    Remove,
    /// The user retried with the preserved file
    Retry,
    /// The success display window ran out
    DisplayElapsed,
}

impl SessionEvent {
    /// Verb used in error messages
    pub fn action(&self) -> &'static str {
        match self {
            SessionEvent::FileAccepted | SessionEvent::FileRejected => "select a file",
            SessionEvent::RequestUpload => "start an upload",
            SessionEvent::Confirm => "confirm the passphrase",
            SessionEvent::Encrypted => "finish encryption",
            SessionEvent::Stored => "finish the upload",
            SessionEvent::Failed => "fail",
            SessionEvent::Remove => "remove the file",
            SessionEvent::Retry => "retry",
            SessionEvent::DisplayElapsed => "reset",
        }
    }
}

/// Next state for `event` in `state`, or `None` if the event is not allowed
pub fn transition(state: SessionState, event: SessionEvent) -> Option<SessionState> {
    use SessionEvent as E;
    use SessionState as S;

    match (state, event) {
        (S::Idle | S::FileSelected | S::Error, E::FileAccepted) => Some(S::FileSelected),
        (S::Idle | S::FileSelected | S::Error, E::FileRejected) => Some(S::Error),
        (S::FileSelected, E::RequestUpload) => Some(S::PassphraseDisclosed),
        (S::PassphraseDisclosed, E::Confirm) => Some(S::Encrypting),
        (S::Encrypting, E::Encrypted) => Some(S::Uploading),
        (S::Uploading, E::Stored) => Some(S::Success),
        (S::FileSelected | S::PassphraseDisclosed | S::Encrypting | S::Uploading, E::Failed) => {
            Some(S::Error)
        }
        (S::FileSelected | S::PassphraseDisclosed | S::Error | S::Success, E::Remove) => {
            Some(S::Idle)
        }
        (S::Error, E::Retry) => Some(S::FileSelected),
        (S::Success, E::DisplayElapsed) => Some(S::Idle),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionEvent as E;
    use SessionState as S;

    const ALL_STATES: [SessionState; 7] = [
        S::Idle,
        S::FileSelected,
        S::PassphraseDisclosed,
        S::Encrypting,
        S::Uploading,
        S::Success,
        S::Error,
    ];

    #[test]
    fn test_happy_path() {
        let mut state = S::Idle;
        for event in [E::FileAccepted, E::RequestUpload, E::Confirm, E::Encrypted, E::Stored] {
            state = transition(state, event).unwrap();
        }
        assert_eq!(state, S::Success);
        assert_eq!(transition(state, E::DisplayElapsed), Some(S::Idle));
    }

    #[test]
    fn test_no_skipping_steps() {
        assert_eq!(transition(S::FileSelected, E::Confirm), None);
        assert_eq!(transition(S::Idle, E::RequestUpload), None);
        assert_eq!(transition(S::PassphraseDisclosed, E::Encrypted), None);
        assert_eq!(transition(S::Encrypting, E::Stored), None);
    }

    #[test]
    fn test_busy_states_cannot_be_removed() {
        assert_eq!(transition(S::Encrypting, E::Remove), None);
        assert_eq!(transition(S::Uploading, E::Remove), None);
    }

    #[test]
    fn test_remove_targets() {
        for state in ALL_STATES {
            let expected = match state {
                S::FileSelected | S::PassphraseDisclosed | S::Error | S::Success => Some(S::Idle),
                _ => None,
            };
            assert_eq!(transition(state, E::Remove), expected, "remove from {:?}", state);
        }
    }

    #[test]
    fn test_success_is_frozen() {
        for event in [
            E::FileAccepted,
            E::FileRejected,
            E::RequestUpload,
            E::Confirm,
            E::Failed,
            E::Retry,
        ] {
            assert_eq!(transition(S::Success, event), None, "{:?}", event);
        }
    }

    #[test]
    fn test_failures_lead_to_error() {
        for state in [S::FileSelected, S::PassphraseDisclosed, S::Encrypting, S::Uploading] {
            assert_eq!(transition(state, E::Failed), Some(S::Error));
        }
        assert_eq!(transition(S::Idle, E::FileRejected), Some(S::Error));
        assert_eq!(transition(S::Error, E::Retry), Some(S::FileSelected));
    }

    #[test]
    fn test_busy_and_terminal() {
        assert!(S::Encrypting.is_busy());
        assert!(S::Uploading.is_busy());
        assert!(!S::PassphraseDisclosed.is_busy());
        assert!(S::Success.is_terminal());
        assert!(S::Error.is_terminal());
    }
}
