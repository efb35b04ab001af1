//! Session identity, connection states and disconnect classification.
//!
//! # Connection lifecycle
//!
//! ```text
//! Uninitialized ──► Connecting ──► Open
//!                      ▲  │
//!                      │  ├──► ClosedRetryable ──┐
//!                      │  │                      │ (automatic)
//!                      └──┼──────────────────────┘
//!                         └──► ClosedLoggedOut   (terminal)
//! ```
//!
//! Only a [`DisconnectReason::LoggedOut`] closure is fatal.  Every other
//! reason is transient and the session manager reconnects on its own.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length of a session name.
///
/// Names double as storage keys (file names for the file-backed store), so
/// they are kept short and restricted to a portable character set.
pub const MAX_SESSION_NAME_LEN: usize = 64;

/// Error returned when a caller-supplied session name is unusable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionNameError {
    #[error("session name must not be empty")]
    Empty,
    #[error("session name is longer than {MAX_SESSION_NAME_LEN} characters")]
    TooLong,
    #[error("session name contains invalid character {0:?}; allowed: A-Z a-z 0-9 . _ -")]
    InvalidChar(char),
    #[error("session name must not start with '.'")]
    LeadingDot,
}

/// Caller-chosen unique name of a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionName(String);

impl SessionName {
    /// Validates `raw` and wraps it.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionNameError`] when the name is empty, too long,
    /// starts with a dot, or contains characters outside `[A-Za-z0-9._-]`.
    pub fn parse(raw: impl Into<String>) -> Result<Self, SessionNameError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(SessionNameError::Empty);
        }
        if raw.len() > MAX_SESSION_NAME_LEN {
            return Err(SessionNameError::TooLong);
        }
        if raw.starts_with('.') {
            return Err(SessionNameError::LeadingDot);
        }
        if let Some(c) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Err(SessionNameError::InvalidChar(c));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionName {
    type Error = SessionNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<SessionName> for String {
    fn from(name: SessionName) -> Self {
        name.0
    }
}

/// State of a session's live connection.
///
/// Never persisted: it is recomputed every time a session is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// Constructed, `start()` not called yet.
    Uninitialized,
    /// Socket opening or handshake in progress; pairing challenges may arrive.
    Connecting,
    /// Authenticated and online.  An identity is always known in this state.
    Open,
    /// Closed for a transient reason; a new attempt follows automatically.
    ClosedRetryable,
    /// Credentials were invalidated remotely.  Terminal.
    ClosedLoggedOut,
}

impl ConnectionState {
    /// `true` once no further automatic transition will happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::ClosedLoggedOut)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "UNINITIALIZED",
            Self::Connecting => "CONNECTING",
            Self::Open => "OPEN",
            Self::ClosedRetryable => "CLOSED_RETRYABLE",
            Self::ClosedLoggedOut => "CLOSED_LOGGED_OUT",
        };
        f.write_str(s)
    }
}

/// Why the network closed a connection.
///
/// The network reports closures as HTTP-like status codes; see
/// [`DisconnectReason::from_status_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// 401: the device was unlinked.  Fatal.
    LoggedOut,
    /// 428
    ConnectionClosed,
    /// 408
    ConnectionLost,
    /// 408, raised locally when a keepalive or query times out.
    TimedOut,
    /// 440: another connection for the same credentials took over.
    ConnectionReplaced,
    /// 411
    MultideviceMismatch,
    /// 403
    Forbidden,
    /// 500
    BadSession,
    /// 503
    UnavailableService,
    /// 515: the network asks for a fresh socket, typically right after pairing.
    RestartRequired,
    /// Any code not listed above.
    Unknown(u16),
}

impl DisconnectReason {
    /// Classifies a numeric status code.
    pub fn from_status_code(code: u16) -> Self {
        match code {
            401 => Self::LoggedOut,
            428 => Self::ConnectionClosed,
            408 => Self::ConnectionLost,
            440 => Self::ConnectionReplaced,
            411 => Self::MultideviceMismatch,
            403 => Self::Forbidden,
            500 => Self::BadSession,
            503 => Self::UnavailableService,
            515 => Self::RestartRequired,
            other => Self::Unknown(other),
        }
    }

    pub fn status_code(self) -> u16 {
        match self {
            Self::LoggedOut => 401,
            Self::ConnectionClosed => 428,
            Self::ConnectionLost | Self::TimedOut => 408,
            Self::ConnectionReplaced => 440,
            Self::MultideviceMismatch => 411,
            Self::Forbidden => 403,
            Self::BadSession => 500,
            Self::UnavailableService => 503,
            Self::RestartRequired => 515,
            Self::Unknown(code) => code,
        }
    }

    /// `true` for every reason except [`DisconnectReason::LoggedOut`].
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::LoggedOut)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoggedOut => write!(f, "logged out"),
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::ConnectionLost => write!(f, "connection lost"),
            Self::TimedOut => write!(f, "timed out"),
            Self::ConnectionReplaced => write!(f, "connection replaced"),
            Self::MultideviceMismatch => write!(f, "multi-device mismatch"),
            Self::Forbidden => write!(f, "forbidden"),
            Self::BadSession => write!(f, "bad session"),
            Self::UnavailableService => write!(f, "service unavailable"),
            Self::RestartRequired => write!(f, "restart required"),
            Self::Unknown(code) => write!(f, "unknown ({code})"),
        }
    }
}

/// Self-contact information of a paired session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Network address of this device, e.g. `"5511999999999:12@s.whatsapp.net"`.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Secondary, privacy-preserving address when the network assigns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lid: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            lid: None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_name_accepts_portable_characters() {
        let name = SessionName::parse("alice_01.work-phone").unwrap();
        assert_eq!(name.as_str(), "alice_01.work-phone");
    }

    #[test]
    fn test_session_name_rejects_empty() {
        assert_eq!(SessionName::parse(""), Err(SessionNameError::Empty));
    }

    #[test]
    fn test_session_name_rejects_path_separators() {
        assert_eq!(
            SessionName::parse("../etc"),
            Err(SessionNameError::LeadingDot)
        );
        assert_eq!(
            SessionName::parse("a/b"),
            Err(SessionNameError::InvalidChar('/'))
        );
    }

    #[test]
    fn test_session_name_rejects_overlong_input() {
        let raw = "x".repeat(MAX_SESSION_NAME_LEN + 1);
        assert_eq!(SessionName::parse(raw), Err(SessionNameError::TooLong));
    }

    #[test]
    fn test_session_name_deserialize_validates() {
        let ok: Result<SessionName, _> = serde_json::from_str("\"bob\"");
        assert!(ok.is_ok());
        let bad: Result<SessionName, _> = serde_json::from_str("\"b o b\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_connection_state_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&ConnectionState::ClosedLoggedOut).unwrap();
        assert_eq!(json, "\"CLOSED_LOGGED_OUT\"");
        assert_eq!(ConnectionState::ClosedRetryable.to_string(), "CLOSED_RETRYABLE");
    }

    #[test]
    fn test_only_logged_out_is_terminal() {
        assert!(ConnectionState::ClosedLoggedOut.is_terminal());
        assert!(!ConnectionState::ClosedRetryable.is_terminal());
        assert!(!ConnectionState::Open.is_terminal());
    }

    #[test]
    fn test_status_code_401_is_logged_out_and_not_retryable() {
        let reason = DisconnectReason::from_status_code(401);
        assert_eq!(reason, DisconnectReason::LoggedOut);
        assert!(!reason.is_retryable());
    }

    #[test]
    fn test_known_status_codes_are_retryable() {
        for code in [428, 408, 440, 411, 403, 500, 503, 515] {
            let reason = DisconnectReason::from_status_code(code);
            assert!(reason.is_retryable(), "{code} must be retryable");
            assert_eq!(reason.status_code(), code);
        }
    }

    #[test]
    fn test_unknown_status_code_is_preserved() {
        let reason = DisconnectReason::from_status_code(499);
        assert_eq!(reason, DisconnectReason::Unknown(499));
        assert_eq!(reason.status_code(), 499);
        assert!(reason.is_retryable());
    }
}
