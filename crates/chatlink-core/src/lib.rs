//! # chatlink-core
//!
//! Shared types for chatlink: the session gateway that keeps authenticated
//! connections to an external messaging network alive.
//!
//! This crate has no I/O.  It defines the vocabulary the session manager
//! and the HTTP surface both speak:
//!
//! - **`domain`** – Session names, connection states, disconnect reasons,
//!   the signed-in identity and the credential blob with its key material.
//!
//! - **`protocol`** – The closed set of raw events a protocol engine emits
//!   (credential updates, connection updates, message batches, ...) and the
//!   binary-to-text codec used whenever key material leaves memory.

pub mod domain;
pub mod protocol;

pub use domain::credentials::{Credentials, KeyPair, SignedKeyPair};
pub use domain::session::{
    ConnectionState, DisconnectReason, Identity, SessionName, SessionNameError,
};
pub use protocol::codec::{decode_bytes, encode_bytes, CodecError, KeyBytes};
pub use protocol::events::RawEvent;
