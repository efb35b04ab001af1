//! QrCodeIssuer: the current pairing challenge of one session, plus waiters.
//!
//! While a session is pairing, the network issues a new challenge every few
//! seconds.  The issuer keeps only the latest one ("current") and hands each
//! new challenge to exactly one waiter, oldest first.
//!
//! # Waiting without leaks
//!
//! ```text
//! await_challenge ──► register(id, oneshot) ──► timeout(rx)
//!                          │                        │
//!                          │  on_challenge pops     ├─ Ok(challenge)
//!                          └──────► tx.send ────────┤
//!                                                   └─ Err: rx.close(), try_recv()
//! ```
//!
//! A [`WaitGuard`] removes the registration on every exit path, including
//! the caller dropping the future.  Closing the receiver before the final
//! `try_recv` settles the race with a concurrent `on_challenge`: either the
//! challenge already landed and is returned, or the send fails and the
//! challenge moves on to the next waiter.  A wait never resolves twice.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chatlink_core::SessionName;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Errors returned by the challenge waits.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChallengeError {
    #[error("no pairing challenge within {}ms", .waited.as_millis())]
    Timeout { waited: Duration },
    /// The session was shut down, logged out or paired while waiting.
    #[error("challenge wait cancelled")]
    Cancelled,
}

/// Failure of a [`ChallengeRenderer`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to render pairing challenge: {0}")]
pub struct RenderError(pub String);

/// Displayable forms of a challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedChallenge {
    /// `data:` URL of an image, ready for an `<img src>`.
    pub data_url: String,
    /// Text rendering for terminals.
    pub terminal: String,
}

/// Turns a raw challenge payload into a scannable artifact.
pub trait ChallengeRenderer: Send + Sync {
    fn render(&self, payload: &str) -> Result<RenderedChallenge, RenderError>;
}

/// One challenge as issued to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingChallenge {
    pub payload: String,
    /// `None` when rendering failed; the raw payload is still usable.
    pub artifact: Option<RenderedChallenge>,
    /// 1 for the first challenge of this issuer, incremented per challenge.
    pub sequence: u64,
    pub issued_at: Instant,
}

struct Waiter {
    id: u64,
    tx: oneshot::Sender<Arc<PairingChallenge>>,
}

#[derive(Default)]
struct IssuerState {
    current: Option<Arc<PairingChallenge>>,
    sequence: u64,
    next_waiter_id: u64,
    waiters: VecDeque<Waiter>,
}

pub struct QrCodeIssuer {
    session: SessionName,
    renderer: Arc<dyn ChallengeRenderer>,
    ttl: Duration,
    state: Mutex<IssuerState>,
}

impl QrCodeIssuer {
    pub fn new(session: SessionName, renderer: Arc<dyn ChallengeRenderer>, ttl: Duration) -> Self {
        Self {
            session,
            renderer,
            ttl,
            state: Mutex::new(IssuerState::default()),
        }
    }

    /// Replaces the current challenge and fulfils the oldest live waiter.
    pub fn on_challenge(&self, payload: &str) -> Arc<PairingChallenge> {
        let artifact = match self.renderer.render(payload) {
            Ok(artifact) => Some(artifact),
            Err(e) => {
                warn!(session = %self.session, "{e}");
                None
            }
        };

        let mut state = self.lock();
        state.sequence += 1;
        let challenge = Arc::new(PairingChallenge {
            payload: payload.to_string(),
            artifact,
            sequence: state.sequence,
            issued_at: Instant::now(),
        });
        state.current = Some(Arc::clone(&challenge));

        // Waiters whose receiver is gone are skipped; the challenge goes to
        // the next one in line.
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.tx.send(Arc::clone(&challenge)).is_ok() {
                debug!(session = %self.session, waiter = waiter.id, "challenge handed to waiter");
                break;
            }
        }
        drop(state);

        info!(session = %self.session, sequence = challenge.sequence, "pairing challenge issued");
        if let Some(artifact) = &challenge.artifact {
            debug!(session = %self.session, "scan to pair:\n{}", artifact.terminal);
        }
        challenge
    }

    /// The current challenge, unless it is older than the TTL.
    pub fn current(&self) -> Option<Arc<PairingChallenge>> {
        let state = self.lock();
        self.live(&state)
    }

    /// Forgets the current challenge (session opened or logged out).
    pub fn clear(&self) {
        self.lock().current = None;
    }

    /// Fails every pending wait with [`ChallengeError::Cancelled`].
    pub fn cancel_waiters(&self) {
        let drained: Vec<Waiter> = self.lock().waiters.drain(..).collect();
        if !drained.is_empty() {
            debug!(session = %self.session, count = drained.len(), "challenge waiters cancelled");
        }
        // Dropping the senders wakes the receivers with an error.
    }

    pub fn pending_waiters(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Waits for the next challenge issued after this call.
    ///
    /// Never returns the challenge that was current when the call started.
    ///
    /// # Errors
    ///
    /// [`ChallengeError::Timeout`] after `timeout`, [`ChallengeError::Cancelled`]
    /// when [`cancel_waiters`](Self::cancel_waiters) runs first.
    pub async fn await_challenge(
        &self,
        timeout: Duration,
    ) -> Result<Arc<PairingChallenge>, ChallengeError> {
        let (guard, rx) = {
            let mut state = self.lock();
            self.register(&mut state)
        };
        self.wait(guard, rx, timeout).await
    }

    /// Returns the current challenge if there is a live one, otherwise waits
    /// like [`await_challenge`](Self::await_challenge).
    pub async fn current_or_next(
        &self,
        timeout: Duration,
    ) -> Result<Arc<PairingChallenge>, ChallengeError> {
        let (guard, rx) = {
            let mut state = self.lock();
            if let Some(current) = self.live(&state) {
                return Ok(current);
            }
            self.register(&mut state)
        };
        self.wait(guard, rx, timeout).await
    }

    // ── Private helpers ──────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, IssuerState> {
        // The state has no invariants a panicking holder could break halfway.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn live(&self, state: &IssuerState) -> Option<Arc<PairingChallenge>> {
        state
            .current
            .as_ref()
            .filter(|c| c.issued_at.elapsed() < self.ttl)
            .cloned()
    }

    fn register(
        &self,
        state: &mut IssuerState,
    ) -> (WaitGuard<'_>, oneshot::Receiver<Arc<PairingChallenge>>) {
        let (tx, rx) = oneshot::channel();
        state.next_waiter_id += 1;
        let id = state.next_waiter_id;
        state.waiters.push_back(Waiter { id, tx });
        (WaitGuard { issuer: self, id }, rx)
    }

    async fn wait(
        &self,
        _guard: WaitGuard<'_>,
        mut rx: oneshot::Receiver<Arc<PairingChallenge>>,
        timeout: Duration,
    ) -> Result<Arc<PairingChallenge>, ChallengeError> {
        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(challenge)) => Ok(challenge),
            Ok(Err(_)) => Err(ChallengeError::Cancelled),
            Err(_) => {
                rx.close();
                match rx.try_recv() {
                    Ok(challenge) => Ok(challenge),
                    Err(_) => {
                        debug!(session = %self.session, "challenge wait timed out");
                        Err(ChallengeError::Timeout { waited: timeout })
                    }
                }
            }
        }
    }
}

/// Deregisters a waiter when the wait ends for any reason.
struct WaitGuard<'a> {
    issuer: &'a QrCodeIssuer,
    id: u64,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        let id = self.id;
        self.issuer.lock().waiters.retain(|w| w.id != id);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
