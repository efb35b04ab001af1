//! TOML-based gateway configuration.
//!
//! Sessions are stored by default under the platform data directory:
//! - Windows:  `%APPDATA%\chatlink\sessions`
//! - Linux:    `$XDG_DATA_HOME/chatlink/sessions` or `~/.local/share/chatlink/sessions`
//! - macOS:    `~/Library/Application Support/chatlink/sessions`
//!
//! Example file:
//!
//! ```toml
//! [storage]
//! dir = "/var/lib/chatlink/sessions"
//!
//! [reconnect]
//! max_attempts = 10
//! initial_delay_ms = 500
//! max_delay_ms = 30000
//! multiplier = 2.0
//!
//! [pairing]
//! qr_timeout_ms = 15000
//! challenge_ttl_ms = 60000
//!
//! [logging]
//! level = "info"
//! ```
//!
//! # Serde default values
//!
//! Every section and field has a default, so a missing file, an empty file
//! or a file written by an older version all produce a complete
//! configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::connection::{ReconnectPolicy, SessionSettings};
use crate::application::message_cache::DEFAULT_MESSAGE_CACHE_CAPACITY;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform data directory could not be determined.
    #[error("could not determine platform data directory")]
    NoPlatformDataDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub pairing: PairingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Directory of the file-backed credential store.  `None` resolves to
    /// the platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectConfig {
    /// Absent means retry forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// `0` reconnects immediately.
    #[serde(default)]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PairingConfig {
    #[serde(default = "default_qr_timeout_ms")]
    pub qr_timeout_ms: u64,
    #[serde(default = "default_challenge_ttl_ms")]
    pub challenge_ttl_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` level or filter directive, e.g. `"info"` or
    /// `"chatlink_sessions=debug"`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_qr_timeout_ms() -> u64 {
    15_000
}
fn default_challenge_ttl_ms() -> u64 {
    60_000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_delay_ms: 0,
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            qr_timeout_ms: default_qr_timeout_ms(),
            challenge_ttl_ms: default_challenge_ttl_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl GatewayConfig {
    /// Per-session settings derived from this configuration.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            reconnect: ReconnectPolicy {
                max_attempts: self.reconnect.max_attempts,
                initial_delay: Duration::from_millis(self.reconnect.initial_delay_ms),
                max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
                multiplier: self.reconnect.multiplier,
            },
            challenge_ttl: Duration::from_millis(self.pairing.challenge_ttl_ms),
            qr_timeout: Duration::from_millis(self.pairing.qr_timeout_ms),
            message_cache_capacity: DEFAULT_MESSAGE_CACHE_CAPACITY,
        }
    }

    /// The configured store directory, or the platform default.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NoPlatformDataDir`] when nothing is configured and the
    /// platform directory cannot be determined.
    pub fn storage_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage.dir {
            Some(dir) => Ok(dir.clone()),
            None => default_storage_dir(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// `{platform data dir}/chatlink/sessions`.
///
/// # Errors
///
/// [`ConfigError::NoPlatformDataDir`] when the environment does not reveal
/// the platform data directory.
pub fn default_storage_dir() -> Result<PathBuf, ConfigError> {
    platform_data_dir()
        .map(|dir| dir.join("sessions"))
        .ok_or(ConfigError::NoPlatformDataDir)
}

/// Loads a [`GatewayConfig`] from `path`, returning the defaults if the file
/// does not exist.
///
/// # Errors
///
/// [`ConfigError::Io`] for file-system errors other than "not found", and
/// [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(GatewayConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories.
///
/// # Errors
///
/// [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &GatewayConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves `{platform data dir}/chatlink`.
fn platform_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("chatlink"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local").join("share"))
            })?;
        Some(base.join("chatlink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("chatlink")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
