//! Application layer of the session connection manager.
//!
//! # What lives here? (for beginners)
//!
//! This layer holds the stateful logic of chatlink and nothing else: no
//! file system, no real network, no image rendering.  It talks to the
//! outside world only through traits that `infrastructure` implements:
//!
//! - [`CredentialStore`] – durable persistence of credentials and keys.
//! - [`ProtocolEngine`] / [`engine::ProtocolSocket`] – the chat protocol.
//! - [`qr_issuer::ChallengeRenderer`] – turns a challenge into an image.
//!
//! # Sub-modules
//!
//! - **`credential_store`** – the persistence seam and its error type.
//! - **`engine`**           – the protocol engine seam.
//! - **`key_store`**        – per-session cached view of signal keys.
//! - **`qr_issuer`**        – current pairing challenge + one-shot waiters.
//! - **`message_cache`**    – bounded cache answering resend queries.
//! - **`router`**           – turns raw events into typed notifications.
//! - **`connection`**       – the per-session state machine and driver task.
//! - **`registry`**         – one machine per session name.
//! - **`error`**            – the caller-facing error taxonomy.

pub mod connection;
pub mod credential_store;
pub mod engine;
pub mod error;
pub mod key_store;
pub mod message_cache;
pub mod qr_issuer;
pub mod registry;
pub mod router;

pub use connection::{ConnectionStateMachine, ReconnectPolicy, SessionSettings, SessionStatus};
pub use credential_store::{CredentialStore, KeyUpdate, StoreError, StoredSession};
pub use engine::{EngineError, ProtocolEngine, ProtocolSocket};
pub use error::SessionError;
pub use qr_issuer::{ChallengeError, PairingChallenge, QrCodeIssuer};
pub use registry::SessionRegistry;
pub use router::{ControlCommand, EventRouter, SessionNotification};
