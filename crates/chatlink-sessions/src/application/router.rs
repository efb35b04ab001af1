//! EventRouter: raw protocol events in, typed notifications out.
//!
//! The router is owned by the session's driver task and sees events in the
//! order the engine emitted them.  Each [`RawEvent`] variant has its own
//! handler:
//!
//! | Event              | Handling                                              |
//! |--------------------|-------------------------------------------------------|
//! | `CredsUpdate`      | save through the store, then notify                   |
//! | `ConnectionUpdate` | QR → issuer; phase → [`Transition`] for the driver    |
//! | `MessagesUpsert`   | record for resends; run control commands; forward     |
//! | history / receipts / presence / contacts | forward verbatim                |
//!
//! A credential update is awaited to completion before the next event is
//! looked at, so a save always lands before a later closure makes the
//! driver reconnect and read credentials again.

use std::sync::Arc;

use chatlink_core::protocol::events::{
    ConnectionPhase, ConnectionUpdate, ContactUpdate, HistorySync, HistorySyncType,
    MessageUpsert, PresenceUpdate, Receipt, UpsertKind, WireMessage,
};
use chatlink_core::{ConnectionState, Credentials, DisconnectReason, Identity, RawEvent, SessionName};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::application::credential_store::{CredentialStore, StoreError};
use crate::application::engine::ProtocolSocket;
use crate::application::message_cache::MessageCache;
use crate::application::qr_issuer::QrCodeIssuer;

/// Number of messages asked for by an on-demand history sync.
pub const ON_DEMAND_HISTORY_COUNT: u32 = 50;

/// Plain-text messages that trigger a protocol operation instead of being
/// delivered as content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlCommand {
    /// `requestPlaceholder`: ask the phone to resend a placeholder message.
    PlaceholderResend,
    /// `onDemandHistSync`: ask the phone for older messages of the chat.
    OnDemandHistorySync,
}

impl ControlCommand {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "requestPlaceholder" => Some(Self::PlaceholderResend),
            "onDemandHistSync" => Some(Self::OnDemandHistorySync),
            _ => None,
        }
    }
}

/// Typed notifications published to session subscribers.
#[derive(Debug, Clone)]
pub enum SessionNotification {
    StateChanged {
        state: ConnectionState,
        reason: Option<DisconnectReason>,
    },
    /// A new credential blob was persisted.
    CredentialsUpdated { registered: bool },
    /// A credential blob could not be persisted; it is retried before the
    /// next reconnect.
    PersistenceFailed { error: String },
    ChallengeIssued { sequence: u64 },
    Messages(MessageUpsert),
    HistorySync(Box<HistorySync>),
    Receipts(Vec<Receipt>),
    Presence(PresenceUpdate),
    Contacts(Vec<ContactUpdate>),
    ControlHandled {
        command: ControlCommand,
        request_id: String,
    },
    ControlFailed {
        command: ControlCommand,
        error: String,
    },
    /// The reconnect policy gave up.
    RetriesExhausted { attempts: u32 },
}

/// What a routed event asks the connection state machine to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    None,
    Connecting,
    Opened(Identity),
    Closed(DisconnectReason),
}

pub struct EventRouter {
    session: SessionName,
    store: Arc<dyn CredentialStore>,
    issuer: Arc<QrCodeIssuer>,
    cache: Arc<MessageCache>,
    notifications: broadcast::Sender<SessionNotification>,
    /// Newest blob seen on the socket, saved or not.
    latest: Option<Credentials>,
    /// Newest blob whose save failed.
    pending: Option<Credentials>,
}

impl EventRouter {
    pub fn new(
        session: SessionName,
        store: Arc<dyn CredentialStore>,
        issuer: Arc<QrCodeIssuer>,
        cache: Arc<MessageCache>,
        notifications: broadcast::Sender<SessionNotification>,
    ) -> Self {
        Self {
            session,
            store,
            issuer,
            cache,
            notifications,
            latest: None,
            pending: None,
        }
    }

    /// Credentials the current socket was opened with; used as the fallback
    /// identity source on open.
    pub fn set_connected_credentials(&mut self, credentials: Credentials) {
        self.latest = Some(credentials);
    }

    pub fn latest_credentials(&self) -> Option<&Credentials> {
        self.latest.as_ref()
    }

    pub fn has_pending_credentials(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_credentials(&self) -> Option<&Credentials> {
        self.pending.as_ref()
    }

    /// Records a blob whose save failed outside the event path, so the next
    /// [`flush_pending`](Self::flush_pending) retries it.
    pub fn mark_pending(&mut self, credentials: Credentials) {
        self.latest = Some(credentials.clone());
        self.pending = Some(credentials);
    }

    /// Retries the save of a blob that failed earlier.
    ///
    /// # Errors
    ///
    /// The store error; the blob stays pending.
    pub async fn flush_pending(&mut self) -> Result<(), StoreError> {
        let Some(credentials) = self.pending.as_ref() else {
            return Ok(());
        };
        self.store.save(&self.session, credentials).await?;
        info!(session = %self.session, "pending credentials persisted");
        self.pending = None;
        Ok(())
    }

    /// Drops any unsaved blob, e.g. after a logout purged the record.
    pub fn discard_credentials(&mut self) {
        self.latest = None;
        self.pending = None;
    }

    pub async fn route(&mut self, event: RawEvent, socket: &dyn ProtocolSocket) -> Transition {
        debug!(session = %self.session, event = event.kind(), "routing event");
        match event {
            RawEvent::CredsUpdate(credentials) => {
                self.on_creds_update(*credentials).await;
                Transition::None
            }
            RawEvent::ConnectionUpdate(update) => self.on_connection_update(update),
            RawEvent::MessagesUpsert(upsert) => {
                self.on_messages_upsert(upsert, socket).await;
                Transition::None
            }
            RawEvent::HistorySync(history) => {
                self.on_history_sync(history);
                Transition::None
            }
            RawEvent::ReceiptUpdate(receipts) => {
                self.publish(SessionNotification::Receipts(receipts));
                Transition::None
            }
            RawEvent::PresenceUpdate(presence) => {
                self.publish(SessionNotification::Presence(presence));
                Transition::None
            }
            RawEvent::ContactsUpdate(contacts) => {
                self.publish(SessionNotification::Contacts(contacts));
                Transition::None
            }
        }
    }

    // ── Handlers ─────────────────────────────────────────────────────────────

    async fn on_creds_update(&mut self, credentials: Credentials) {
        let registered = credentials.registered;
        match self.store.save(&self.session, &credentials).await {
            Ok(()) => {
                debug!(session = %self.session, registered, "credentials persisted");
                self.pending = None;
                self.latest = Some(credentials);
                self.publish(SessionNotification::CredentialsUpdated { registered });
            }
            Err(e) => {
                // The socket stays up; the save is retried before reconnecting.
                warn!(session = %self.session, error = %e, "failed to persist credentials");
                self.pending = Some(credentials.clone());
                self.latest = Some(credentials);
                self.publish(SessionNotification::PersistenceFailed {
                    error: e.to_string(),
                });
            }
        }
    }

    fn on_connection_update(&mut self, update: ConnectionUpdate) -> Transition {
        if let Some(payload) = update.qr.as_deref() {
            let challenge = self.issuer.on_challenge(payload);
            self.publish(SessionNotification::ChallengeIssued {
                sequence: challenge.sequence,
            });
        }

        match update.connection {
            None => Transition::None,
            Some(ConnectionPhase::Connecting) => Transition::Connecting,
            Some(ConnectionPhase::Open) => {
                let identity = update
                    .identity
                    .or_else(|| self.latest.as_ref().and_then(|c| c.me.clone()));
                match identity {
                    Some(identity) => Transition::Opened(identity),
                    None => {
                        warn!(session = %self.session, "socket opened without an identity");
                        Transition::Closed(DisconnectReason::BadSession)
                    }
                }
            }
            Some(ConnectionPhase::Close) => {
                let reason = update
                    .last_disconnect
                    .map(|d| d.reason)
                    .unwrap_or(DisconnectReason::ConnectionClosed);
                Transition::Closed(reason)
            }
        }
    }

    async fn on_messages_upsert(&mut self, upsert: MessageUpsert, socket: &dyn ProtocolSocket) {
        for message in &upsert.messages {
            self.cache.record(message);
        }

        if let Some(request_id) = &upsert.request_id {
            debug!(session = %self.session, request_id = %request_id, "batch answers an earlier request");
        }

        if upsert.kind != UpsertKind::Notify {
            self.publish(SessionNotification::Messages(upsert));
            return;
        }

        let MessageUpsert {
            kind,
            messages,
            request_id,
        } = upsert;
        let mut content = Vec::with_capacity(messages.len());
        for message in messages {
            match self.control_command(&message, request_id.is_some()) {
                Some(command) => self.run_control(command, &message, socket).await,
                None => content.push(message),
            }
        }

        if !content.is_empty() {
            self.publish(SessionNotification::Messages(MessageUpsert {
                kind,
                messages: content,
                request_id,
            }));
        }
    }

    fn on_history_sync(&self, history: HistorySync) {
        if history.sync_type == HistorySyncType::OnDemand {
            debug!(session = %self.session, messages = history.messages.len(), "on-demand history received");
        }
        info!(
            session = %self.session,
            chats = history.chats.len(),
            contacts = history.contacts.len(),
            messages = history.messages.len(),
            is_latest = history.is_latest,
            progress = ?history.progress,
            sync_type = ?history.sync_type,
            "history sync received"
        );
        for message in &history.messages {
            self.cache.record(message);
        }
        self.publish(SessionNotification::HistorySync(Box::new(history)));
    }

    // ── Control commands ─────────────────────────────────────────────────────

    fn control_command(&self, message: &WireMessage, answers_request: bool) -> Option<ControlCommand> {
        match ControlCommand::parse(message.text()?)? {
            // A resend answer echoing the trigger text must not loop.
            ControlCommand::PlaceholderResend if answers_request => None,
            command => Some(command),
        }
    }

    async fn run_control(
        &self,
        command: ControlCommand,
        message: &WireMessage,
        socket: &dyn ProtocolSocket,
    ) {
        let result = match command {
            ControlCommand::PlaceholderResend => {
                socket.request_placeholder_resend(&message.key).await
            }
            ControlCommand::OnDemandHistorySync => match message.timestamp {
                Some(timestamp) => {
                    socket
                        .fetch_message_history(ON_DEMAND_HISTORY_COUNT, &message.key, timestamp)
                        .await
                }
                None => {
                    self.publish(SessionNotification::ControlFailed {
                        command,
                        error: "message has no timestamp".to_string(),
                    });
                    return;
                }
            },
        };

        match result {
            Ok(request_id) => {
                info!(session = %self.session, ?command, request_id = %request_id, "control command sent");
                self.publish(SessionNotification::ControlHandled {
                    command,
                    request_id,
                });
            }
            Err(e) => {
                warn!(session = %self.session, ?command, error = %e, "control command failed");
                self.publish(SessionNotification::ControlFailed {
                    command,
                    error: e.to_string(),
                });
            }
        }
    }

    fn publish(&self, notification: SessionNotification) {
        // No subscribers is fine.
        let _ = self.notifications.send(notification);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
