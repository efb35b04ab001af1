//! The seam to the protocol engine.
//!
//! The engine performs the handshake, encryption and framing of the chat
//! protocol.  chatlink treats it as an opaque socket factory: hand it the
//! prior credentials plus a key store, get back a socket handle and an
//! ordered stream of [`RawEvent`]s.
//!
//! The engine also calls back into chatlink through [`MessageResolver`]
//! when it must re-send a message whose content it no longer holds.

use std::sync::Arc;

use async_trait::async_trait;
use chatlink_core::protocol::events::{MessageContent, MessageKey, WireMessage};
use chatlink_core::{Credentials, RawEvent, SessionName};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::application::key_store::SessionKeyStore;

/// Errors reported by a protocol engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("failed to open socket: {0}")]
    ConnectFailed(String),
    #[error("socket is not connected")]
    NotConnected,
    #[error("engine operation failed: {0}")]
    Operation(String),
}

/// Everything the engine needs to open a socket for one session.
pub struct SocketOptions {
    pub session: SessionName,
    /// Credentials to authenticate with; fresh ones trigger pairing.
    pub credentials: Credentials,
    pub key_store: Arc<SessionKeyStore>,
    pub message_resolver: Arc<dyn MessageResolver>,
}

/// A live socket plus the ordered stream of events it produces.
///
/// The stream ending (`recv()` returning `None`) means the socket is gone.
pub struct EngineConnection {
    pub socket: Arc<dyn ProtocolSocket>,
    pub events: mpsc::Receiver<RawEvent>,
}

/// Socket factory.
#[async_trait]
pub trait ProtocolEngine: Send + Sync {
    async fn connect(&self, options: SocketOptions) -> Result<EngineConnection, EngineError>;
}

/// Outbound operations on an open socket.
#[async_trait]
pub trait ProtocolSocket: Send + Sync {
    /// Sends a plain text message and returns it as the engine recorded it.
    async fn send_text(&self, jid: &str, text: &str) -> Result<WireMessage, EngineError>;

    /// Asks the phone to resend a message that arrived as a placeholder.
    /// Returns the request id the answer will carry.
    async fn request_placeholder_resend(&self, key: &MessageKey) -> Result<String, EngineError>;

    /// Asks the phone for `count` messages older than `oldest`.
    async fn fetch_message_history(
        &self,
        count: u32,
        oldest: &MessageKey,
        oldest_timestamp: u64,
    ) -> Result<String, EngineError>;

    /// Requests a numeric pairing code for `phone_number`, the alternative
    /// to scanning a QR challenge.
    async fn request_pairing_code(&self, phone_number: &str) -> Result<String, EngineError>;

    /// Unlinks the device.  The engine follows up with a logged-out closure.
    async fn logout(&self) -> Result<(), EngineError>;

    /// Closes the socket.  Idempotent.
    async fn close(&self);
}

/// Answers the engine's "what was in this message?" queries.
#[async_trait]
pub trait MessageResolver: Send + Sync {
    /// Returns `None` when the content is unknown, which is allowed but
    /// degrades delivery retries.
    async fn resolve_historical_message(&self, key: &MessageKey) -> Option<MessageContent>;
}
