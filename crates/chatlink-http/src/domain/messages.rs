//! JSON bodies of the HTTP surface.
//!
//! Field names are camelCase on the wire:
//!
//! ```json
//! {"sessionName":"alice"}
//! {"connectionState":"OPEN","identity":{"id":"alice@s"}}
//! ```

use chatlink_core::{ConnectionState, Identity, SessionName};
use chatlink_sessions::application::qr_issuer::PairingChallenge;
use chatlink_sessions::SessionStatus;
use serde::{Deserialize, Serialize};

// ── Requests ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub session_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingCodeRequest {
    pub phone_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTextRequest {
    pub jid: String,
    pub text: String,
}

// ── Responses ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    pub session_name: SessionName,
}

/// `GET /sessions/{name}/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub connection_state: ConnectionState,
    pub identity: Option<Identity>,
}

impl From<&SessionStatus> for StatusResponse {
    fn from(status: &SessionStatus) -> Self {
        Self {
            connection_state: status.connection_state,
            identity: status.identity.clone(),
        }
    }
}

/// `GET /sessions/{name}/qrcode`.
///
/// `qrCode` is the rendered data URL; `payload` is the raw challenge for
/// clients that render it themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrCodeResponse {
    pub session_name: SessionName,
    pub qr_code: Option<String>,
    pub payload: String,
    pub sequence: u64,
}

impl QrCodeResponse {
    pub fn new(session_name: SessionName, challenge: &PairingChallenge) -> Self {
        Self {
            session_name,
            qr_code: challenge.artifact.as_ref().map(|a| a.data_url.clone()),
            payload: challenge.payload.clone(),
            sequence: challenge.sequence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingCodeResponse {
    pub session_name: SessionName,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSent {
    pub id: String,
    pub jid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionList {
    pub sessions: Vec<SessionStatus>,
}

/// Error body for every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_reads_camel_case() {
        let req: CreateSessionRequest =
            serde_json::from_str(r#"{"sessionName":"alice"}"#).unwrap();
        assert_eq!(req.session_name, "alice");
    }

    #[test]
    fn test_pairing_code_request_reads_phone_number() {
        let req: PairingCodeRequest =
            serde_json::from_str(r#"{"phoneNumber":"+55 11 9999"}"#).unwrap();
        assert_eq!(req.phone_number, "+55 11 9999");
    }

    #[test]
    fn test_status_response_uses_wire_state_names() {
        // Arrange
        let status = StatusResponse {
            connection_state: ConnectionState::ClosedLoggedOut,
            identity: None,
        };

        // Act
        let json = serde_json::to_value(&status).unwrap();

        // Assert
        assert_eq!(json["connectionState"], "CLOSED_LOGGED_OUT");
        assert!(json["identity"].is_null());
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let result: Result<SendTextRequest, _> = serde_json::from_str(r#"{"jid":"x@s"}"#);
        assert!(result.is_err());
    }
}
