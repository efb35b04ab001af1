//! HTTP server configuration.
//!
//! [`HttpConfig`] is a plain struct filled in by `main.rs` from CLI flags and
//! the gateway TOML file; nothing in the library reads the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use chatlink_sessions::SessionSettings;

pub const DEFAULT_BIND: &str = "0.0.0.0:3000";

#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Address the HTTP listener binds to.
    pub bind_addr: SocketAddr,
    /// Directory of the file-backed credential store.
    pub store_dir: PathBuf,
    /// How long `GET /sessions/{name}/qrcode` waits for a challenge.
    pub qr_timeout: Duration,
    pub sessions: SessionSettings,
}

impl HttpConfig {
    pub fn new(bind_addr: SocketAddr, store_dir: PathBuf, sessions: SessionSettings) -> Self {
        Self {
            bind_addr,
            store_dir,
            qr_timeout: sessions.qr_timeout,
            sessions,
        }
    }
}
