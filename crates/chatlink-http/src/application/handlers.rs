//! Route handlers.
//!
//! Every handler is a thin translation: parse the session name, ask the
//! [`SessionRegistry`] for the machine, call one operation, shape the JSON.
//! All state lives in `chatlink-sessions`.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chatlink_core::SessionName;
use chatlink_sessions::{ConnectionStateMachine, SessionRegistry, SessionStatus};
use tracing::info;

use crate::application::error::ApiError;
use crate::domain::messages::{
    CreateSessionRequest, MessageSent, PairingCodeRequest, PairingCodeResponse, QrCodeResponse,
    SendTextRequest, SessionCreated, SessionList, StatusResponse,
};

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    /// Bound for QR waits.
    pub qr_timeout: Duration,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>, qr_timeout: Duration) -> Self {
        Self {
            registry,
            qr_timeout,
        }
    }

    /// The active machine, or one started from persisted credentials.
    async fn session(&self, raw: String) -> Result<Arc<ConnectionStateMachine>, ApiError> {
        let name = SessionName::parse(raw)?;
        Ok(self.registry.rehydrate(&name).await?)
    }
}

pub async fn health() -> &'static str {
    "OK"
}

/// `POST /sessions`
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<SessionCreated>, ApiError> {
    let name = SessionName::parse(req.session_name)?;
    let machine = state.registry.get_or_create(&name).await?;
    info!(session = %name, "session requested over http");
    Ok(Json(SessionCreated {
        session_name: machine.name().clone(),
    }))
}

/// `GET /sessions`
pub async fn list_sessions(State(state): State<AppState>) -> Json<SessionList> {
    Json(SessionList {
        sessions: state.registry.list().await,
    })
}

/// `GET /sessions/{name}`: 404 when nothing is active or persisted.
pub async fn get_session(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SessionStatus>, ApiError> {
    let machine = state.session(name).await?;
    Ok(Json(machine.status()))
}

/// `GET /sessions/{name}/qrcode`: the current challenge, or the next one
/// within the configured bound.
pub async fn qr_code(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<QrCodeResponse>, ApiError> {
    let machine = state.session(name).await?;
    let challenge = machine.qr_code(state.qr_timeout).await?;
    Ok(Json(QrCodeResponse::new(machine.name().clone(), &challenge)))
}

/// `GET /sessions/{name}/status`
pub async fn status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let machine = state.session(name).await?;
    Ok(Json(StatusResponse::from(&machine.status())))
}

/// `DELETE /sessions/{name}`: unlinks the device and purges credentials.
pub async fn logout(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let machine = state.session(name).await?;
    machine.logout().await?;
    Ok(Json(StatusResponse::from(&machine.status())))
}

/// `POST /sessions/{name}/pairing-code`
pub async fn pairing_code(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<PairingCodeRequest>,
) -> Result<Json<PairingCodeResponse>, ApiError> {
    if !req.phone_number.chars().any(|c| c.is_ascii_digit()) {
        return Err(ApiError::BadRequest("phoneNumber has no digits".to_string()));
    }
    let machine = state.session(name).await?;
    let code = machine.request_pairing_code(&req.phone_number).await?;
    Ok(Json(PairingCodeResponse {
        session_name: machine.name().clone(),
        code,
    }))
}

/// `POST /sessions/{name}/messages`
pub async fn send_text(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<SendTextRequest>,
) -> Result<(StatusCode, Json<MessageSent>), ApiError> {
    if req.jid.trim().is_empty() {
        return Err(ApiError::BadRequest("jid must not be empty".to_string()));
    }
    let machine = state.session(name).await?;
    let sent = machine.send_text(&req.jid, &req.text).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageSent {
            id: sent.key.id,
            jid: sent.key.remote_jid,
        }),
    ))
}
