//! Offline protocol engine for local runs.
//!
//! Unregistered credentials get a fresh QR challenge immediately and then
//! every [`QR_ROTATE_INTERVAL`] up to [`QR_ROTATIONS`] times, after which
//! the socket closes with a timeout, like the network does for an unscanned
//! code.  Nobody can scan a simulated code, so pairing completes through
//! `request_pairing_code`: a few seconds later the socket emits registered
//! credentials and closes with "restart required"; the reconnect opens.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chatlink_core::protocol::events::{
    ConnectionPhase, ConnectionUpdate, MessageContent, MessageKey, WireMessage,
};
use chatlink_core::{Credentials, DisconnectReason, Identity, RawEvent, SessionName};
use tokio::sync::{mpsc, watch};
use tracing::debug;
use uuid::Uuid;

use crate::application::engine::{
    EngineConnection, EngineError, ProtocolEngine, ProtocolSocket, SocketOptions,
};

pub const QR_ROTATE_INTERVAL: Duration = Duration::from_secs(20);
pub const QR_ROTATIONS: u32 = 5;
const PAIRING_DELAY: Duration = Duration::from_secs(3);
const EVENT_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedEngine;

impl SimulatedEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProtocolEngine for SimulatedEngine {
    async fn connect(&self, options: SocketOptions) -> Result<EngineConnection, EngineError> {
        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        let (stop, stopped) = watch::channel(false);
        let socket = Arc::new(SimulatedSocket {
            session: options.session.clone(),
            credentials: Mutex::new(options.credentials.clone()),
            events: tx.clone(),
            stop,
        });

        if options.credentials.registered {
            let identity = options
                .credentials
                .me
                .clone()
                .unwrap_or_else(|| default_identity(&options.session));
            tokio::spawn(run_registered(tx, identity));
        } else {
            tokio::spawn(run_pairing(tx, options.credentials, stopped));
        }

        Ok(EngineConnection { socket, events: rx })
    }
}

async fn run_registered(events: mpsc::Sender<RawEvent>, identity: Identity) {
    let connecting = ConnectionUpdate {
        connection: Some(ConnectionPhase::Connecting),
        ..ConnectionUpdate::default()
    };
    let _ = events.send(RawEvent::ConnectionUpdate(connecting)).await;
    let _ = events
        .send(RawEvent::ConnectionUpdate(ConnectionUpdate::open(identity)))
        .await;
}

async fn run_pairing(
    events: mpsc::Sender<RawEvent>,
    credentials: Credentials,
    mut stopped: watch::Receiver<bool>,
) {
    for _ in 0..QR_ROTATIONS {
        let qr = challenge_payload(&credentials);
        if events
            .send(RawEvent::ConnectionUpdate(ConnectionUpdate::challenge(qr)))
            .await
            .is_err()
        {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(QR_ROTATE_INTERVAL) => {}
            _ = stopped.changed() => return,
        }
    }
    let _ = events
        .send(RawEvent::ConnectionUpdate(ConnectionUpdate::closed(
            DisconnectReason::TimedOut,
        )))
        .await;
}

/// `ref,noiseKey,identityKey,advSecret`, the shape of a real challenge.
fn challenge_payload(credentials: &Credentials) -> String {
    format!(
        "2@{},{},{},{}",
        Uuid::new_v4().simple(),
        STANDARD.encode(credentials.noise_key.public.as_bytes()),
        STANDARD.encode(credentials.signed_identity_key.public.as_bytes()),
        STANDARD.encode(credentials.adv_secret_key.as_bytes()),
    )
}

fn default_identity(session: &SessionName) -> Identity {
    Identity::new(format!("{session}@s.whatsapp.net"))
}

struct SimulatedSocket {
    session: SessionName,
    credentials: Mutex<Credentials>,
    events: mpsc::Sender<RawEvent>,
    stop: watch::Sender<bool>,
}

impl SimulatedSocket {
    fn ensure_open(&self) -> Result<(), EngineError> {
        if *self.stop.borrow() {
            Err(EngineError::NotConnected)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ProtocolSocket for SimulatedSocket {
    async fn send_text(&self, jid: &str, text: &str) -> Result<WireMessage, EngineError> {
        self.ensure_open()?;
        Ok(WireMessage {
            key: MessageKey {
                remote_jid: jid.to_string(),
                from_me: true,
                id: Uuid::new_v4().simple().to_string().to_uppercase(),
                participant: None,
            },
            content: Some(MessageContent::Conversation {
                text: text.to_string(),
            }),
            timestamp: Some(crate::application::credential_store::unix_now()),
            push_name: None,
        })
    }

    async fn request_placeholder_resend(&self, key: &MessageKey) -> Result<String, EngineError> {
        self.ensure_open()?;
        debug!(session = %self.session, id = %key.id, "simulated placeholder resend");
        Ok(Uuid::new_v4().to_string())
    }

    async fn fetch_message_history(
        &self,
        count: u32,
        oldest: &MessageKey,
        _oldest_timestamp: u64,
    ) -> Result<String, EngineError> {
        self.ensure_open()?;
        debug!(session = %self.session, count, id = %oldest.id, "simulated history request");
        Ok(Uuid::new_v4().to_string())
    }

    async fn request_pairing_code(&self, phone_number: &str) -> Result<String, EngineError> {
        self.ensure_open()?;
        let digits: String = phone_number.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return Err(EngineError::Operation("phone number has no digits".to_string()));
        }

        let mut paired = self
            .credentials
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        paired.registered = true;
        paired.me = Some(Identity::new(format!("{digits}:1@s.whatsapp.net")));

        let events = self.events.clone();
        let mut stopped = self.stop.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(PAIRING_DELAY) => {}
                _ = stopped.changed() => return,
            }
            let _ = events.send(RawEvent::CredsUpdate(Box::new(paired))).await;
            let _ = events
                .send(RawEvent::ConnectionUpdate(ConnectionUpdate::closed(
                    DisconnectReason::RestartRequired,
                )))
                .await;
        });

        let code = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
        Ok(code)
    }

    async fn logout(&self) -> Result<(), EngineError> {
        self.ensure_open()?;
        debug!(session = %self.session, "simulated logout");
        Ok(())
    }

    async fn close(&self) {
        self.stop.send_replace(true);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::key_store::SessionKeyStore;
    use crate::application::message_cache::MessageCache;
    use crate::infrastructure::storage::MemoryCredentialStore;

    fn options(credentials: Credentials) -> SocketOptions {
        let name = SessionName::parse("sim").unwrap();
        SocketOptions {
            session: name.clone(),
            credentials,
            key_store: Arc::new(SessionKeyStore::new(
                name,
                Arc::new(MemoryCredentialStore::new()),
            )),
            message_resolver: Arc::new(MessageCache::default()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregistered_connect_rotates_challenges_then_times_out() {
        // Arrange
        let mut conn = SimulatedEngine::new()
            .connect(options(Credentials::fresh()))
            .await
            .unwrap();

        // Act
        let mut challenges = 0;
        let closed = loop {
            match conn.events.recv().await.unwrap() {
                RawEvent::ConnectionUpdate(u) if u.qr.is_some() => challenges += 1,
                RawEvent::ConnectionUpdate(u) if u.connection == Some(ConnectionPhase::Close) => {
                    break u.last_disconnect.unwrap().reason
                }
                other => panic!("unexpected event {other:?}"),
            }
        };

        // Assert
        assert_eq!(challenges, QR_ROTATIONS);
        assert_eq!(closed, DisconnectReason::TimedOut);
    }

    #[tokio::test]
    async fn test_registered_connect_opens_with_stored_identity() {
        let mut creds = Credentials::fresh();
        creds.registered = true;
        creds.me = Some(Identity::new("5511:3@s.whatsapp.net"));

        let mut conn = SimulatedEngine::new().connect(options(creds)).await.unwrap();

        let mut opened = None;
        while let Some(RawEvent::ConnectionUpdate(u)) = conn.events.recv().await {
            if u.connection == Some(ConnectionPhase::Open) {
                opened = u.identity;
                break;
            }
        }
        assert_eq!(opened.unwrap().id, "5511:3@s.whatsapp.net");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pairing_code_completes_pairing_and_requests_restart() {
        // Arrange
        let mut conn = SimulatedEngine::new()
            .connect(options(Credentials::fresh()))
            .await
            .unwrap();

        // Act
        let code = conn.socket.request_pairing_code("+55 11 9999").await.unwrap();

        // Assert
        assert_eq!(code.len(), 8);
        let mut registered = false;
        loop {
            match conn.events.recv().await.unwrap() {
                RawEvent::CredsUpdate(c) => {
                    registered = c.registered;
                    assert_eq!(c.me.unwrap().id, "55119999:1@s.whatsapp.net");
                }
                RawEvent::ConnectionUpdate(u) if u.connection == Some(ConnectionPhase::Close) => {
                    assert_eq!(
                        u.last_disconnect.unwrap().reason,
                        DisconnectReason::RestartRequired
                    );
                    break;
                }
                _ => {}
            }
        }
        assert!(registered);
    }

    #[tokio::test]
    async fn test_closed_socket_rejects_operations() {
        let conn = SimulatedEngine::new()
            .connect(options(Credentials::fresh()))
            .await
            .unwrap();

        conn.socket.close().await;

        assert_eq!(
            conn.socket.send_text("x@s", "hi").await.unwrap_err(),
            EngineError::NotConnected
        );
    }
}
