//! ConnectionStateMachine: the lifecycle of one session's live connection.
//!
//! # Driver task
//!
//! Every state transition of a session happens on a single task, the
//! driver, which owns the [`EventRouter`] and the retry loop:
//!
//! ```text
//! loop {
//!     flush unsaved credentials
//!     CONNECTING  (total_attempts += 1)
//!     load credentials ── miss ──► fresh credentials, saved
//!     engine.connect()
//!     pump: select { shutdown | commands | next event → router }
//!     close socket
//!     ├─ shutdown          → exit
//!     ├─ logged out        → purge, CLOSED_LOGGED_OUT, exit
//!     └─ anything else     → CLOSED_RETRYABLE (retry_count += 1)
//!                            policy exhausted? exit : back off, loop
//! }
//! ```
//!
//! The machine itself is a handle: it publishes snapshots through a
//! `watch` channel and typed notifications through a `broadcast` channel,
//! and reaches the driver through a shutdown signal and a command queue.
//! Dropping or shutting down the handle stops the retry loop.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chatlink_core::protocol::events::WireMessage;
use chatlink_core::{ConnectionState, Credentials, DisconnectReason, Identity, SessionName};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::application::credential_store::{CredentialStore, StoreError};
use crate::application::engine::{MessageResolver, ProtocolEngine, ProtocolSocket, SocketOptions};
use crate::application::error::SessionError;
use crate::application::key_store::SessionKeyStore;
use crate::application::message_cache::{MessageCache, DEFAULT_MESSAGE_CACHE_CAPACITY};
use crate::application::qr_issuer::{ChallengeRenderer, PairingChallenge, QrCodeIssuer};
use crate::application::router::{EventRouter, SessionNotification, Transition};

const NOTIFICATION_CAPACITY: usize = 256;
const COMMAND_CAPACITY: usize = 8;

// ── Policy and settings ───────────────────────────────────────────────────────

/// When and how often a closed connection is retried.
///
/// The delay before reconnect `n` (1-based) is
/// `min(initial_delay * multiplier^(n-1), max_delay)`.  A zero initial delay
/// reconnects immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl ReconnectPolicy {
    /// Unbounded, immediate retries.
    pub fn immediate() -> Self {
        Self {
            max_attempts: None,
            initial_delay: Duration::ZERO,
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.initial_delay.is_zero() || attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exponent);
        let secs = self.initial_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Whether reconnect number `attempt` may happen.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::immediate()
    }
}

/// Per-session tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub reconnect: ReconnectPolicy,
    /// A challenge older than this is no longer "current".
    pub challenge_ttl: Duration,
    /// Default bound for QR waits.
    pub qr_timeout: Duration,
    pub message_cache_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            challenge_ttl: Duration::from_secs(60),
            qr_timeout: Duration::from_secs(15),
            message_cache_capacity: DEFAULT_MESSAGE_CACHE_CAPACITY,
        }
    }
}

/// Snapshot of a session, published on every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub session_name: SessionName,
    pub connection_state: ConnectionState,
    pub identity: Option<Identity>,
    pub last_disconnect: Option<DisconnectReason>,
    /// Consecutive failed attempts since the last OPEN.
    pub retry_count: u32,
    pub total_attempts: u32,
    pub has_challenge: bool,
    pub registered: bool,
}

impl SessionStatus {
    fn new(session_name: SessionName) -> Self {
        Self {
            session_name,
            connection_state: ConnectionState::Uninitialized,
            identity: None,
            last_disconnect: None,
            retry_count: 0,
            total_attempts: 0,
            has_challenge: false,
            registered: false,
        }
    }
}

/// What the store held when the machine was created.
#[derive(Debug, Clone)]
pub enum PriorState {
    Fresh,
    Persisted(Credentials),
}

// ── Shared state ──────────────────────────────────────────────────────────────

struct SessionShared {
    name: SessionName,
    store: Arc<dyn CredentialStore>,
    engine: Arc<dyn ProtocolEngine>,
    issuer: Arc<QrCodeIssuer>,
    cache: Arc<MessageCache>,
    key_store: Arc<SessionKeyStore>,
    settings: SessionSettings,
    status: watch::Sender<SessionStatus>,
    notifications: broadcast::Sender<SessionNotification>,
    socket: RwLock<Option<Arc<dyn ProtocolSocket>>>,
}

impl SessionShared {
    fn publish(&self, notification: SessionNotification) {
        let _ = self.notifications.send(notification);
    }

    fn state(&self) -> ConnectionState {
        self.status.borrow().connection_state
    }

    fn socket(&self) -> Option<Arc<dyn ProtocolSocket>> {
        self.socket
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map(Arc::clone)
    }

    fn set_socket(&self, socket: Option<Arc<dyn ProtocolSocket>>) {
        *self.socket.write().unwrap_or_else(|p| p.into_inner()) = socket;
    }

    /// Applies `f` to the status and announces a state change if any.
    fn update(&self, f: impl FnOnce(&mut SessionStatus)) {
        let mut changed = None;
        self.status.send_modify(|status| {
            let before = status.connection_state;
            f(status);
            status.has_challenge = self.issuer.current().is_some();
            if status.connection_state != before {
                changed = Some((status.connection_state, status.last_disconnect));
            }
        });
        if let Some((state, reason)) = changed {
            info!(session = %self.name, %state, "connection state changed");
            self.publish(SessionNotification::StateChanged { state, reason });
        }
    }

    /// Refreshes derived fields without waking watchers needlessly.
    fn refresh(&self, registered: Option<bool>) {
        let has_challenge = self.issuer.current().is_some();
        self.status.send_if_modified(|status| {
            let registered = registered.unwrap_or(status.registered);
            if status.has_challenge == has_challenge && status.registered == registered {
                return false;
            }
            status.has_challenge = has_challenge;
            status.registered = registered;
            true
        });
    }

    /// Deletes persisted credentials and enters the terminal state.
    async fn purge(&self) {
        if let Err(e) = self.store.delete(&self.name).await {
            error!(session = %self.name, error = %e, "failed to purge credentials");
        }
        self.key_store.clear().await;
        self.issuer.clear();
        self.issuer.cancel_waiters();
        self.update(|s| {
            s.connection_state = ConnectionState::ClosedLoggedOut;
            s.last_disconnect = Some(DisconnectReason::LoggedOut);
            s.identity = None;
            s.registered = false;
        });
        info!(session = %self.name, "session logged out; credentials purged");
    }
}

// ── Driver plumbing ───────────────────────────────────────────────────────────

enum Command {
    Logout {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
}

struct DriverHandle {
    shutdown: watch::Sender<bool>,
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

enum AttemptEnd {
    Shutdown,
    LoggedOut(Option<oneshot::Sender<Result<(), SessionError>>>),
    /// `None` when the attempt failed before the socket produced a reason.
    Disconnected(Option<DisconnectReason>),
}

// ── The machine ───────────────────────────────────────────────────────────────

pub struct ConnectionStateMachine {
    shared: Arc<SessionShared>,
    prior: Mutex<Option<PriorState>>,
    driver: tokio::sync::Mutex<Option<DriverHandle>>,
}

impl ConnectionStateMachine {
    pub fn new(
        name: SessionName,
        store: Arc<dyn CredentialStore>,
        engine: Arc<dyn ProtocolEngine>,
        renderer: Arc<dyn ChallengeRenderer>,
        settings: SessionSettings,
    ) -> Self {
        let issuer = Arc::new(QrCodeIssuer::new(
            name.clone(),
            renderer,
            settings.challenge_ttl,
        ));
        let cache = Arc::new(MessageCache::new(settings.message_cache_capacity));
        let key_store = Arc::new(SessionKeyStore::new(name.clone(), Arc::clone(&store)));
        let (status, _) = watch::channel(SessionStatus::new(name.clone()));
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        Self {
            shared: Arc::new(SessionShared {
                name,
                store,
                engine,
                issuer,
                cache,
                key_store,
                settings,
                status,
                notifications,
                socket: RwLock::new(None),
            }),
            prior: Mutex::new(None),
            driver: tokio::sync::Mutex::new(None),
        }
    }

    pub fn name(&self) -> &SessionName {
        &self.shared.name
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.shared.settings
    }

    /// Reads the store once so the first connect attempt does not have to.
    ///
    /// # Errors
    ///
    /// [`SessionError::Persistence`] when the store fails for a reason other
    /// than a missing record.
    pub async fn preload_credentials(&self) -> Result<PriorState, SessionError> {
        let prior = match self.shared.store.load(&self.shared.name).await {
            Ok(stored) => PriorState::Persisted(stored.credentials),
            Err(StoreError::NotFound(_)) => PriorState::Fresh,
            Err(e) => return Err(SessionError::Persistence(e)),
        };
        if let PriorState::Persisted(credentials) = &prior {
            let registered = credentials.registered;
            self.shared.refresh(Some(registered));
        }
        *self.prior.lock().unwrap_or_else(|p| p.into_inner()) = Some(prior.clone());
        Ok(prior)
    }

    /// Starts the driver task.  Idempotent while a driver is running.
    ///
    /// # Errors
    ///
    /// [`SessionError::LoggedOut`] once the session reached
    /// `CLOSED_LOGGED_OUT`; a new session request is needed then.
    pub async fn start(&self) -> Result<(), SessionError> {
        let mut driver = self.driver.lock().await;
        if driver.as_ref().is_some_and(|d| !d.task.is_finished()) {
            return Ok(());
        }
        if self.shared.state().is_terminal() {
            return Err(SessionError::LoggedOut(self.shared.name.clone()));
        }

        let prior = self.prior.lock().unwrap_or_else(|p| p.into_inner()).take();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let task = tokio::spawn(drive(
            Arc::clone(&self.shared),
            prior,
            shutdown_rx,
            command_rx,
        ));
        info!(session = %self.shared.name, "session driver started");
        *driver = Some(DriverHandle {
            shutdown: shutdown_tx,
            commands: command_tx,
            task,
        });
        Ok(())
    }

    pub fn status(&self) -> SessionStatus {
        let mut status = self.shared.status.borrow().clone();
        status.has_challenge = self.shared.issuer.current().is_some();
        status
    }

    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.shared.status.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotification> {
        self.shared.notifications.subscribe()
    }

    pub fn retry_count(&self) -> u32 {
        self.shared.status.borrow().retry_count
    }

    /// Waits until the session reaches `state`.
    ///
    /// # Errors
    ///
    /// [`SessionError::Timeout`] when `timeout` elapses first.
    pub async fn wait_for_state(
        &self,
        state: ConnectionState,
        timeout: Duration,
    ) -> Result<SessionStatus, SessionError> {
        let mut rx = self.watch_status();
        let waited = tokio::time::timeout(timeout, async {
            rx.wait_for(|s| s.connection_state == state)
                .await
                .map(|s| s.clone())
        })
        .await;
        match waited {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(_)) => Err(SessionError::ShutDown(self.shared.name.clone())),
            Err(_) => Err(SessionError::Timeout(timeout)),
        }
    }

    pub fn current_challenge(&self) -> Option<Arc<PairingChallenge>> {
        self.shared.issuer.current()
    }

    /// Waits for the next challenge issued after this call.
    ///
    /// # Errors
    ///
    /// [`SessionError::Timeout`] when none arrives within `timeout`,
    /// [`SessionError::LoggedOut`] for a terminal session.
    pub async fn await_challenge(
        &self,
        timeout: Duration,
    ) -> Result<Arc<PairingChallenge>, SessionError> {
        self.ensure_not_logged_out()?;
        self.shared
            .issuer
            .await_challenge(timeout)
            .await
            .map_err(|e| SessionError::from_challenge(&self.shared.name, e))
    }

    /// The live challenge if any, otherwise the next one.
    pub async fn qr_code(&self, timeout: Duration) -> Result<Arc<PairingChallenge>, SessionError> {
        self.ensure_not_logged_out()?;
        self.shared
            .issuer
            .current_or_next(timeout)
            .await
            .map_err(|e| SessionError::from_challenge(&self.shared.name, e))
    }

    /// Sends a text message on an OPEN session.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotConnected`] unless the session is OPEN.
    pub async fn send_text(&self, jid: &str, text: &str) -> Result<WireMessage, SessionError> {
        self.ensure_not_logged_out()?;
        let socket = match (self.shared.state(), self.shared.socket()) {
            (ConnectionState::Open, Some(socket)) => socket,
            _ => return Err(SessionError::NotConnected(self.shared.name.clone())),
        };
        let message = socket.send_text(jid, text).await?;
        self.shared.cache.record(&message);
        debug!(session = %self.shared.name, jid, id = %message.key.id, "text message sent");
        Ok(message)
    }

    /// Asks for a numeric pairing code as an alternative to the QR scan.
    ///
    /// # Errors
    ///
    /// [`SessionError::AlreadyRegistered`] once paired,
    /// [`SessionError::NotConnected`] without a socket.
    pub async fn request_pairing_code(&self, phone_number: &str) -> Result<String, SessionError> {
        self.ensure_not_logged_out()?;
        if self.shared.status.borrow().registered {
            return Err(SessionError::AlreadyRegistered(self.shared.name.clone()));
        }
        let socket = self
            .shared
            .socket()
            .ok_or_else(|| SessionError::NotConnected(self.shared.name.clone()))?;
        let code = socket.request_pairing_code(phone_number).await?;
        info!(session = %self.shared.name, "pairing code issued");
        Ok(code)
    }

    /// Unlinks the device, purges credentials and stops reconnecting.
    pub async fn logout(&self) -> Result<(), SessionError> {
        if self.shared.state().is_terminal() {
            return Ok(());
        }
        let driver = self.driver.lock().await;
        let commands = driver
            .as_ref()
            .filter(|d| !d.task.is_finished())
            .map(|d| d.commands.clone());
        match commands {
            Some(commands) => {
                drop(driver);
                let (reply, rx) = oneshot::channel();
                commands
                    .send(Command::Logout { reply })
                    .await
                    .map_err(|_| SessionError::ShutDown(self.shared.name.clone()))?;
                rx.await
                    .map_err(|_| SessionError::ShutDown(self.shared.name.clone()))?
            }
            None => {
                self.shared.purge().await;
                Ok(())
            }
        }
    }

    /// Stops the driver task and closes the socket.  The session can be
    /// started again unless it is logged out.
    pub async fn shutdown(&self) {
        let handle = self.driver.lock().await.take();
        let Some(handle) = handle else {
            return;
        };
        let _ = handle.shutdown.send(true);
        if let Err(e) = handle.task.await {
            warn!(session = %self.shared.name, error = %e, "session driver ended abnormally");
        }
        self.shared.issuer.cancel_waiters();
        info!(session = %self.shared.name, "session shut down");
    }

    fn ensure_not_logged_out(&self) -> Result<(), SessionError> {
        if self.shared.state().is_terminal() {
            Err(SessionError::LoggedOut(self.shared.name.clone()))
        } else {
            Ok(())
        }
    }
}

impl Drop for ConnectionStateMachine {
    fn drop(&mut self) {
        if let Some(handle) = self.driver.get_mut().take() {
            let _ = handle.shutdown.send(true);
        }
    }
}

// ── Driver task ───────────────────────────────────────────────────────────────

async fn drive(
    shared: Arc<SessionShared>,
    mut prior: Option<PriorState>,
    mut shutdown: watch::Receiver<bool>,
    mut commands: mpsc::Receiver<Command>,
) {
    let mut router = EventRouter::new(
        shared.name.clone(),
        Arc::clone(&shared.store),
        Arc::clone(&shared.issuer),
        Arc::clone(&shared.cache),
        shared.notifications.clone(),
    );

    // Each driver gets the full reconnect budget.
    shared.update(|s| s.retry_count = 0);

    loop {
        if *shutdown.borrow() {
            break;
        }

        // A blob that failed to save must reach the store before it is read.
        // While the store keeps failing, the unsaved blob is reused as is.
        if let Err(e) = router.flush_pending().await {
            warn!(session = %shared.name, error = %e, "pending credentials still unsaved");
            if prior.is_none() {
                prior = router.pending_credentials().cloned().map(PriorState::Persisted);
            }
        }

        shared.update(|s| {
            s.connection_state = ConnectionState::Connecting;
            s.total_attempts += 1;
        });

        let end = match prior.take() {
            Some(prior) => attempt(&shared, &mut router, Ok(prior), &mut shutdown, &mut commands).await,
            None => {
                let loaded = load_credentials(&shared).await;
                attempt(&shared, &mut router, loaded, &mut shutdown, &mut commands).await
            }
        };

        match end {
            AttemptEnd::Shutdown => break,
            AttemptEnd::LoggedOut(reply) => {
                log_out(&shared, &mut router, reply).await;
                break;
            }
            AttemptEnd::Disconnected(reason) => {
                shared.update(|s| {
                    s.connection_state = ConnectionState::ClosedRetryable;
                    s.retry_count += 1;
                    if reason.is_some() {
                        s.last_disconnect = reason;
                    }
                    s.identity = None;
                });
                let retry = shared.status.borrow().retry_count;
                let policy = &shared.settings.reconnect;
                if !policy.allows(retry) {
                    warn!(session = %shared.name, attempts = retry, "reconnect attempts exhausted");
                    shared.publish(SessionNotification::RetriesExhausted { attempts: retry });
                    break;
                }

                let delay = policy.delay_for(retry);
                warn!(
                    session = %shared.name,
                    reason = ?reason,
                    retry,
                    delay_ms = delay.as_millis() as u64,
                    "connection closed; reconnecting"
                );
                match back_off(delay, &mut shutdown, &mut commands).await {
                    BackOff::Elapsed => {}
                    BackOff::Shutdown => break,
                    BackOff::LoggedOut(reply) => {
                        log_out(&shared, &mut router, Some(reply)).await;
                        break;
                    }
                }
            }
        }
    }

    if !shared.state().is_terminal() {
        if let Err(e) = router.flush_pending().await {
            error!(session = %shared.name, error = %e, "credentials lost on driver exit");
        }
    }
    shared.set_socket(None);
    if !shared.state().is_terminal() {
        shared.update(|s| {
            s.connection_state = ConnectionState::ClosedRetryable;
            s.identity = None;
        });
    }
    debug!(session = %shared.name, "session driver stopped");
}

/// Purges the session.  Unsaved credentials are dropped first so nothing
/// writes them back after the delete.
async fn log_out(
    shared: &SessionShared,
    router: &mut EventRouter,
    reply: Option<oneshot::Sender<Result<(), SessionError>>>,
) {
    router.discard_credentials();
    shared.purge().await;
    if let Some(reply) = reply {
        let _ = reply.send(Ok(()));
    }
}

/// Loads the persisted blob; a missing record means a new pairing.
async fn load_credentials(shared: &SessionShared) -> Result<PriorState, StoreError> {
    match shared.store.load(&shared.name).await {
        Ok(stored) => Ok(PriorState::Persisted(stored.credentials)),
        Err(StoreError::NotFound(_)) => Ok(PriorState::Fresh),
        Err(e) => Err(e),
    }
}

async fn attempt(
    shared: &Arc<SessionShared>,
    router: &mut EventRouter,
    prior: Result<PriorState, StoreError>,
    shutdown: &mut watch::Receiver<bool>,
    commands: &mut mpsc::Receiver<Command>,
) -> AttemptEnd {
    let credentials = match prior {
        Ok(PriorState::Persisted(credentials)) => credentials,
        Ok(PriorState::Fresh) => {
            info!(session = %shared.name, "no persisted credentials; starting a new pairing");
            let credentials = Credentials::fresh();
            if let Err(e) = shared.store.save(&shared.name, &credentials).await {
                warn!(session = %shared.name, error = %e, "failed to persist fresh credentials");
                router.mark_pending(credentials.clone());
            }
            credentials
        }
        Err(e) => {
            error!(session = %shared.name, error = %e, "failed to load credentials");
            return AttemptEnd::Disconnected(None);
        }
    };

    let registered = credentials.registered;
    router.set_connected_credentials(credentials.clone());
    shared.refresh(Some(registered));

    let options = SocketOptions {
        session: shared.name.clone(),
        credentials,
        key_store: Arc::clone(&shared.key_store),
        message_resolver: Arc::clone(&shared.cache) as Arc<dyn MessageResolver>,
    };
    let connection = tokio::select! {
        _ = shutdown.changed() => return AttemptEnd::Shutdown,
        connected = shared.engine.connect(options) => connected,
    };
    let connection = match connection {
        Ok(connection) => connection,
        Err(e) => {
            warn!(session = %shared.name, error = %e, "failed to open socket");
            return AttemptEnd::Disconnected(None);
        }
    };

    let socket = connection.socket;
    let mut events = connection.events;
    shared.set_socket(Some(Arc::clone(&socket)));

    let end = loop {
        tokio::select! {
            _ = shutdown.changed() => break AttemptEnd::Shutdown,
            Some(command) = commands.recv() => match command {
                Command::Logout { reply } => match socket.logout().await {
                    Ok(()) => break AttemptEnd::LoggedOut(Some(reply)),
                    Err(e) => {
                        warn!(session = %shared.name, error = %e, "logout failed");
                        let _ = reply.send(Err(SessionError::Engine(e)));
                    }
                },
            },
            event = events.recv() => {
                let Some(event) = event else {
                    break AttemptEnd::Disconnected(Some(DisconnectReason::ConnectionLost));
                };
                match router.route(event, socket.as_ref()).await {
                    Transition::None | Transition::Connecting => {}
                    Transition::Opened(identity) => {
                        shared.issuer.clear();
                        info!(session = %shared.name, id = %identity.id, "session open");
                        shared.update(|s| {
                            s.connection_state = ConnectionState::Open;
                            s.identity = Some(identity);
                            s.retry_count = 0;
                        });
                    }
                    Transition::Closed(DisconnectReason::LoggedOut) => break AttemptEnd::LoggedOut(None),
                    Transition::Closed(reason) => break AttemptEnd::Disconnected(Some(reason)),
                }
                shared.refresh(router.latest_credentials().map(|c| c.registered));
            }
        }
    };

    shared.set_socket(None);
    socket.close().await;
    end
}

enum BackOff {
    Elapsed,
    Shutdown,
    LoggedOut(oneshot::Sender<Result<(), SessionError>>),
}

/// Sleeps before the next attempt while staying responsive to shutdown
/// and logout.
async fn back_off(
    delay: Duration,
    shutdown: &mut watch::Receiver<bool>,
    commands: &mut mpsc::Receiver<Command>,
) -> BackOff {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return BackOff::Elapsed,
            _ = shutdown.changed() => return BackOff::Shutdown,
            Some(command) = commands.recv() => match command {
                Command::Logout { reply } => return BackOff::LoggedOut(reply),
            },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
