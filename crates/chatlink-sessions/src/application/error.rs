//! Caller-facing error taxonomy.
//!
//! Transient disconnects are deliberately absent: they are recovered by the
//! reconnect loop and only observable through [`crate::SessionStatus`].

use std::time::Duration;

use chatlink_core::SessionName;
use thiserror::Error;

use crate::application::credential_store::StoreError;
use crate::application::engine::EngineError;
use crate::application::qr_issuer::ChallengeError;

#[derive(Debug, Error)]
pub enum SessionError {
    /// No active machine and nothing persisted under this name.
    #[error("session {0} not found")]
    NotFound(SessionName),

    /// No pairing challenge arrived within the bound.
    #[error("no pairing challenge within {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("credential persistence failed: {0}")]
    Persistence(#[source] StoreError),

    /// The session was unlinked.  A new session request is required.
    #[error("session {0} is logged out")]
    LoggedOut(SessionName),

    #[error("session {0} is not connected")]
    NotConnected(SessionName),

    /// The operation only makes sense before pairing.
    #[error("session {0} is already registered")]
    AlreadyRegistered(SessionName),

    #[error("protocol engine error: {0}")]
    Engine(#[from] EngineError),

    /// The session was shut down while the call was in flight.
    #[error("session {0} was shut down")]
    ShutDown(SessionName),
}

impl SessionError {
    pub(crate) fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(name) => Self::NotFound(name),
            other => Self::Persistence(other),
        }
    }

    pub(crate) fn from_challenge(session: &SessionName, err: ChallengeError) -> Self {
        match err {
            ChallengeError::Timeout { waited } => Self::Timeout(waited),
            ChallengeError::Cancelled => Self::ShutDown(session.clone()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
