//! chatlink-sessions library entry point.
//!
//! The session connection manager: everything with real state in chatlink.
//!
//! # Architecture
//!
//! ```text
//! caller ──► SessionRegistry ──► ConnectionStateMachine (one driver task per session)
//!                                   │        ▲
//!                      connect()    │        │ RawEvent (in order)
//!                                   ▼        │
//!                              ProtocolEngine socket
//!                                            │
//!                                       EventRouter ──► CredentialStore (persist first)
//!                                            ├────────► QrCodeIssuer
//!                                            └────────► SessionNotification subscribers
//! ```
//!
//! - `application` holds the state machine, registry, router, QR issuer and
//!   the traits the infrastructure implements (`CredentialStore`,
//!   `ProtocolEngine`, `ChallengeRenderer`).
//! - `infrastructure` holds the adapters: file and in-memory credential
//!   stores, the scripted and simulated engines, the QR renderer and the
//!   TOML configuration.
//!
//! **Dependency rule**: `infrastructure` may depend on `application`, never
//! the other way round.

pub mod application;
pub mod infrastructure;

pub use application::{
    ConnectionStateMachine, CredentialStore, EventRouter, ProtocolEngine, QrCodeIssuer,
    ReconnectPolicy, SessionError, SessionNotification, SessionRegistry, SessionSettings,
    SessionStatus,
};
