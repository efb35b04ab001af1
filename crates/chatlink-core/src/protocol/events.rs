//! Raw events emitted by a protocol engine.
//!
//! The engine delivers everything that happens on a socket as one closed
//! set of variants, in emission order.  The session manager routes each
//! variant through its own handler; nothing is dispatched by string key.
//!
//! | Variant            | Meaning                                             |
//! |--------------------|-----------------------------------------------------|
//! | `CredsUpdate`      | New credential blob; replaces the previous one      |
//! | `ConnectionUpdate` | Phase change, pairing challenge, or closure reason  |
//! | `MessagesUpsert`   | New or appended messages                            |
//! | `HistorySync`      | Chats/contacts/messages replayed from the phone     |
//! | `ReceiptUpdate`    | Delivery / read receipts                            |
//! | `PresenceUpdate`   | Typing / online indicators of a chat                |
//! | `ContactsUpdate`   | Contact metadata changes                            |

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::credentials::Credentials;
use crate::domain::session::{DisconnectReason, Identity};
use crate::protocol::codec::KeyBytes;

/// One event read from a protocol engine socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RawEvent {
    CredsUpdate(Box<Credentials>),
    ConnectionUpdate(ConnectionUpdate),
    MessagesUpsert(MessageUpsert),
    HistorySync(HistorySync),
    ReceiptUpdate(Vec<Receipt>),
    PresenceUpdate(PresenceUpdate),
    ContactsUpdate(Vec<ContactUpdate>),
}

impl RawEvent {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CredsUpdate(_) => "creds.update",
            Self::ConnectionUpdate(_) => "connection.update",
            Self::MessagesUpsert(_) => "messages.upsert",
            Self::HistorySync(_) => "messaging-history.set",
            Self::ReceiptUpdate(_) => "message-receipt.update",
            Self::PresenceUpdate(_) => "presence.update",
            Self::ContactsUpdate(_) => "contacts.update",
        }
    }
}

// ── Connection updates ────────────────────────────────────────────────────────

/// Socket phase reported in a [`ConnectionUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    Connecting,
    Open,
    Close,
}

/// Cause attached to a `Close` phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectInfo {
    pub reason: DisconnectReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Partial connection state change.  Every field is optional: a single
/// update may carry only a QR payload, only a phase, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionPhase>,
    /// Raw pairing challenge to be rendered as a QR code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_disconnect: Option<DisconnectInfo>,
    /// Identity of the signed-in device, present on `Open`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_online: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_new_login: Option<bool>,
}

impl ConnectionUpdate {
    pub fn challenge(qr: impl Into<String>) -> Self {
        Self {
            qr: Some(qr.into()),
            ..Self::default()
        }
    }

    pub fn open(identity: Identity) -> Self {
        Self {
            connection: Some(ConnectionPhase::Open),
            identity: Some(identity),
            ..Self::default()
        }
    }

    pub fn closed(reason: DisconnectReason) -> Self {
        Self {
            connection: Some(ConnectionPhase::Close),
            last_disconnect: Some(DisconnectInfo {
                reason,
                message: None,
            }),
            ..Self::default()
        }
    }
}

// ── Messages ──────────────────────────────────────────────────────────────────

/// Addresses one message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageKey {
    pub remote_jid: String,
    pub from_me: bool,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<String>,
}

/// Message payload.  Only text is interpreted; everything else is opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    Conversation { text: String },
    ExtendedText { text: String },
    Opaque { message_type: String, payload: KeyBytes },
}

impl MessageContent {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Conversation { text } | Self::ExtendedText { text } => Some(text),
            Self::Opaque { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub key: MessageKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
    /// Seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,
}

impl WireMessage {
    pub fn text(&self) -> Option<&str> {
        self.content.as_ref().and_then(MessageContent::text)
    }
}

/// Whether an upsert carries live traffic or backfilled messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertKind {
    Notify,
    Append,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageUpsert {
    pub kind: UpsertKind,
    pub messages: Vec<WireMessage>,
    /// Set when the batch answers an earlier request to the phone
    /// (placeholder resend, on-demand history).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

// ── History sync ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySyncType {
    InitialBootstrap,
    InitialStatusV3,
    Full,
    Recent,
    PushName,
    NonBlockingData,
    OnDemand,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub unread_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySync {
    pub chats: Vec<ChatSummary>,
    pub contacts: Vec<ContactUpdate>,
    pub messages: Vec<WireMessage>,
    pub is_latest: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    pub sync_type: HistorySyncType,
}

// ── Receipts, presence, contacts ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptKind {
    Delivered,
    Read,
    Played,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub key: MessageKey,
    pub user_jid: String,
    pub kind: ReceiptKind,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceKind {
    Unavailable,
    Available,
    Composing,
    Recording,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceUpdate {
    pub chat_jid: String,
    pub presences: BTreeMap<String, PresenceKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactUpdate {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img_url: Option<String>,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
