//! chatlink HTTP gateway: entry point.
//!
//! Serves the session API over HTTP, keeping one connection per session name
//! alive in the background.  Credentials are stored as JSON files so sessions
//! survive a restart; `GET /sessions/{name}` rehydrates them on demand.
//!
//! # Usage
//!
//! ```text
//! chatlink-http [OPTIONS]
//!
//! Options:
//!   --bind            <ADDR>  Listen address [default: 0.0.0.0:3000]
//!   --config          <PATH>  Gateway TOML configuration
//!   --store-dir       <DIR>   Credential directory (overrides [storage] dir)
//!   --qr-timeout-secs <SECS>  QR wait bound (overrides [pairing] qr_timeout_ms)
//! ```
//!
//! | Variable              | Flag                |
//! |-----------------------|---------------------|
//! | `CHATLINK_BIND`       | `--bind`            |
//! | `CHATLINK_CONFIG`     | `--config`          |
//! | `CHATLINK_STORE_DIR`  | `--store-dir`       |
//! | `CHATLINK_QR_TIMEOUT` | `--qr-timeout-secs` |
//!
//! `RUST_LOG` overrides the `[logging] level` of the configuration.
//!
//! The protocol engine wired here is the offline simulator: QR challenges
//! rotate but cannot be scanned, and pairing completes through
//! `POST /sessions/{name}/pairing-code`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chatlink_http::domain::config::DEFAULT_BIND;
use chatlink_http::domain::HttpConfig;
use chatlink_http::run_server;
use chatlink_sessions::infrastructure::engine::SimulatedEngine;
use chatlink_sessions::infrastructure::qr_render::QrCodeRenderer;
use chatlink_sessions::infrastructure::storage::config::{load_config, GatewayConfig};
use chatlink_sessions::infrastructure::storage::FileCredentialStore;
use chatlink_sessions::SessionRegistry;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// chatlink session gateway.
#[derive(Debug, Parser)]
#[command(
    name = "chatlink-http",
    about = "HTTP gateway for long-lived chat-network sessions",
    version
)]
struct Cli {
    /// Address the HTTP listener binds to.
    #[arg(long, default_value = DEFAULT_BIND, env = "CHATLINK_BIND")]
    bind: String,

    /// Path of the gateway TOML configuration.  Defaults apply when absent.
    #[arg(long, env = "CHATLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Directory of the credential store.
    #[arg(long, env = "CHATLINK_STORE_DIR")]
    store_dir: Option<PathBuf>,

    /// How long a QR request waits for a challenge, in seconds.
    #[arg(long, env = "CHATLINK_QR_TIMEOUT")]
    qr_timeout_secs: Option<u64>,
}

impl Cli {
    fn load_gateway_config(&self) -> anyhow::Result<GatewayConfig> {
        match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load configuration {}", path.display())),
            None => Ok(GatewayConfig::default()),
        }
    }

    /// Merges the flags over `gateway`.
    ///
    /// # Errors
    ///
    /// Returns an error if `--bind` is not a socket address or no storage
    /// directory can be determined.
    fn into_http_config(self, gateway: &GatewayConfig) -> anyhow::Result<HttpConfig> {
        let bind_addr: SocketAddr = self
            .bind
            .parse()
            .with_context(|| format!("invalid bind address: '{}'", self.bind))?;

        let store_dir = match self.store_dir {
            Some(dir) => dir,
            None => gateway
                .storage_dir()
                .context("no credential directory configured")?,
        };

        let mut sessions = gateway.session_settings();
        if let Some(secs) = self.qr_timeout_secs {
            sessions.qr_timeout = Duration::from_secs(secs);
        }
        Ok(HttpConfig::new(bind_addr, store_dir, sessions))
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let gateway = cli.load_gateway_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&gateway.logging.level)),
        )
        .init();

    let config = cli.into_http_config(&gateway)?;
    info!(
        bind = %config.bind_addr,
        store = %config.store_dir.display(),
        qr_timeout_ms = config.qr_timeout.as_millis() as u64,
        "chatlink gateway starting"
    );

    let registry = Arc::new(SessionRegistry::new(
        Arc::new(FileCredentialStore::new(config.store_dir.clone())),
        Arc::new(SimulatedEngine::new()),
        Arc::new(QrCodeRenderer::new()),
        config.sessions.clone(),
    ));

    match registry.persisted().await {
        Ok(names) if !names.is_empty() => {
            info!(count = names.len(), "persisted sessions found; rehydrated on first request")
        }
        Ok(_) => {}
        Err(e) => error!(error = %e, "failed to list persisted sessions"),
    }

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C; shutting down"),
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    };
    run_server(config, registry, shutdown).await?;

    info!("chatlink gateway stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        // Arrange: no arguments
        let cli = Cli::parse_from(["chatlink-http"]);

        // Assert
        assert_eq!(cli.bind, "0.0.0.0:3000");
        assert!(cli.config.is_none());
        assert!(cli.store_dir.is_none());
        assert!(cli.qr_timeout_secs.is_none());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "chatlink-http",
            "--bind",
            "127.0.0.1:8080",
            "--store-dir",
            "/tmp/sessions",
            "--qr-timeout-secs",
            "30",
        ]);

        assert_eq!(cli.bind, "127.0.0.1:8080");
        assert_eq!(cli.store_dir, Some(PathBuf::from("/tmp/sessions")));
        assert_eq!(cli.qr_timeout_secs, Some(30));
    }

    #[test]
    fn test_into_http_config_applies_overrides() {
        // Arrange
        let cli = Cli::parse_from([
            "chatlink-http",
            "--store-dir",
            "/tmp/sessions",
            "--qr-timeout-secs",
            "5",
        ]);

        // Act
        let config = cli.into_http_config(&GatewayConfig::default()).unwrap();

        // Assert
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.store_dir, PathBuf::from("/tmp/sessions"));
        assert_eq!(config.qr_timeout, Duration::from_secs(5));
        assert_eq!(config.sessions.qr_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_into_http_config_uses_gateway_defaults() {
        let cli = Cli::parse_from(["chatlink-http", "--store-dir", "/tmp/s"]);

        let config = cli.into_http_config(&GatewayConfig::default()).unwrap();

        assert_eq!(config.qr_timeout, Duration::from_millis(15_000));
    }

    #[test]
    fn test_invalid_bind_is_rejected() {
        let cli = Cli::parse_from(["chatlink-http", "--bind", "not-an-addr", "--store-dir", "/x"]);
        assert!(cli.into_http_config(&GatewayConfig::default()).is_err());
    }

    #[test]
    fn test_missing_config_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::parse_from([
            "chatlink-http",
            "--config",
            dir.path().join("absent.toml").to_str().unwrap(),
        ]);

        let gateway = cli.load_gateway_config().unwrap();

        assert_eq!(gateway.logging.level, "info");
    }
}
