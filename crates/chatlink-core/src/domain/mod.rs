//! Domain types with no runtime dependencies.
//!
//! - **`session`** – identity of a session and the states its connection
//!   moves through.
//! - **`credentials`** – the authentication blob that lets a session
//!   reconnect without pairing again.

pub mod credentials;
pub mod session;
