//! Scripted protocol engine for tests.
//!
//! ```text
//! test ──wait_for_connection(n)──► ScriptedConnection ──emit(RawEvent)──► driver
//!                                        │
//!                                        └── socket.calls() ◄── outbound calls
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chatlink_core::protocol::events::{
    ConnectionUpdate, MessageContent, MessageKey, WireMessage,
};
use chatlink_core::{Credentials, DisconnectReason, Identity, RawEvent, SessionName};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::application::engine::{
    EngineConnection, EngineError, MessageResolver, ProtocolEngine, ProtocolSocket,
    SocketOptions,
};
use crate::application::key_store::SessionKeyStore;

const EVENT_CAPACITY: usize = 64;

/// One outbound call made on a [`ScriptedSocket`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketCall {
    SendText { jid: String, text: String },
    PlaceholderResend(MessageKey),
    FetchHistory { count: u32, oldest: MessageKey, timestamp: u64 },
    PairingCode(String),
    Logout,
    Close,
}

#[derive(Default)]
pub struct ScriptedSocket {
    calls: Mutex<Vec<SocketCall>>,
    closed: AtomicBool,
}

impl ScriptedSocket {
    pub fn calls(&self) -> Vec<SocketCall> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn record(&self, call: SocketCall) {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(call);
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.is_closed() {
            Err(EngineError::NotConnected)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ProtocolSocket for ScriptedSocket {
    async fn send_text(&self, jid: &str, text: &str) -> Result<WireMessage, EngineError> {
        self.ensure_open()?;
        self.record(SocketCall::SendText {
            jid: jid.to_string(),
            text: text.to_string(),
        });
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
            timestamp: None,
            push_name: None,
        })
    }

    async fn request_placeholder_resend(&self, key: &MessageKey) -> Result<String, EngineError> {
        self.ensure_open()?;
        self.record(SocketCall::PlaceholderResend(key.clone()));
        Ok(format!("placeholder-{}", key.id))
    }

    async fn fetch_message_history(
        &self,
        count: u32,
        oldest: &MessageKey,
        oldest_timestamp: u64,
    ) -> Result<String, EngineError> {
        self.ensure_open()?;
        self.record(SocketCall::FetchHistory {
            count,
            oldest: oldest.clone(),
            timestamp: oldest_timestamp,
        });
        Ok(format!("history-{}", oldest.id))
    }

    async fn request_pairing_code(&self, phone_number: &str) -> Result<String, EngineError> {
        self.ensure_open()?;
        self.record(SocketCall::PairingCode(phone_number.to_string()));
        Ok("ABCD1234".to_string())
    }

    async fn logout(&self) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.record(SocketCall::Logout);
        Ok(())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.record(SocketCall::Close);
        }
    }
}

/// What a test gets for each successful connect.
#[derive(Clone)]
pub struct ScriptedConnection {
    pub session: SessionName,
    /// Credentials the driver connected with.
    pub credentials: Credentials,
    pub socket: Arc<ScriptedSocket>,
    pub key_store: Arc<SessionKeyStore>,
    pub resolver: Arc<dyn MessageResolver>,
    events: mpsc::Sender<RawEvent>,
}

impl ScriptedConnection {
    /// Pushes `event` to the driver.  Returns `false` once the driver
    /// dropped the socket.
    pub async fn emit(&self, event: RawEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    pub async fn challenge(&self, payload: &str) -> bool {
        self.emit(RawEvent::ConnectionUpdate(ConnectionUpdate::challenge(payload)))
            .await
    }

    pub async fn open(&self, id: &str) -> bool {
        self.emit(RawEvent::ConnectionUpdate(ConnectionUpdate::open(Identity::new(id))))
            .await
    }

    pub async fn close(&self, reason: DisconnectReason) -> bool {
        self.emit(RawEvent::ConnectionUpdate(ConnectionUpdate::closed(reason)))
            .await
    }

    pub async fn creds(&self, credentials: Credentials) -> bool {
        self.emit(RawEvent::CredsUpdate(Box::new(credentials))).await
    }

    /// `true` once the driver stopped reading this connection.
    pub fn is_dropped(&self) -> bool {
        self.events.is_closed()
    }
}

#[derive(Default)]
struct Script {
    connections: Vec<ScriptedConnection>,
    fail_next: usize,
}

/// Engine whose sockets are driven entirely by the test.
pub struct ScriptedEngine {
    script: Mutex<Script>,
    attempts: AtomicUsize,
    connected: watch::Sender<usize>,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedEngine {
    pub fn new() -> Self {
        let (connected, _) = watch::channel(0);
        Self {
            script: Mutex::new(Script::default()),
            attempts: AtomicUsize::new(0),
            connected,
        }
    }

    /// Makes the next `n` connects fail with [`EngineError::ConnectFailed`].
    pub fn fail_next_connects(&self, n: usize) {
        self.lock().fail_next = n;
    }

    /// Connect calls so far, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Successful connects so far.
    pub fn connection_count(&self) -> usize {
        *self.connected.borrow()
    }

    /// Credentials handed to every successful connect, in order.
    pub fn credentials_seen(&self) -> Vec<Credentials> {
        self.lock()
            .connections
            .iter()
            .map(|c| c.credentials.clone())
            .collect()
    }

    /// Waits until the `n`-th (1-based) successful connect and returns it.
    pub async fn wait_for_connection(&self, n: usize) -> Option<ScriptedConnection> {
        let mut rx = self.connected.subscribe();
        rx.wait_for(|count| *count >= n).await.ok()?;
        self.lock().connections.get(n.checked_sub(1)?).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl ProtocolEngine for ScriptedEngine {
    async fn connect(&self, options: SocketOptions) -> Result<EngineConnection, EngineError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        let socket = Arc::new(ScriptedSocket::default());
        {
            let mut script = self.lock();
            if script.fail_next > 0 {
                script.fail_next -= 1;
                return Err(EngineError::ConnectFailed("scripted failure".to_string()));
            }
            script.connections.push(ScriptedConnection {
                session: options.session,
                credentials: options.credentials,
                socket: Arc::clone(&socket),
                key_store: options.key_store,
                resolver: options.message_resolver,
                events: tx,
            });
        }
        self.connected.send_modify(|count| *count += 1);
        Ok(EngineConnection {
            socket,
            events: rx,
        })
    }
}
