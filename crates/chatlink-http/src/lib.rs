//! # chatlink-http
//!
//! The HTTP surface of the session gateway.  Every route delegates to a
//! [`chatlink_sessions::SessionRegistry`]:
//!
//! ```text
//! POST   /sessions                       { sessionName }  → { sessionName }
//! GET    /sessions                                        → { sessions: [...] }
//! GET    /sessions/{name}                                 → session status | 404
//! GET    /sessions/{name}/qrcode                          → { qrCode, payload } | 408
//! GET    /sessions/{name}/status                          → { connectionState, identity }
//! DELETE /sessions/{name}                                 → logout
//! POST   /sessions/{name}/pairing-code   { phoneNumber }  → { code }
//! POST   /sessions/{name}/messages       { jid, text }    → { id, jid }
//! GET    /health                                          → "OK"
//! ```
//!
//! - `domain`         – JSON bodies and [`domain::HttpConfig`].
//! - `application`    – handlers, [`application::AppState`] and the
//!   error-to-status mapping.
//! - `infrastructure` – router assembly and the listener.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{ApiError, AppState};
pub use infrastructure::{router, run_server};
