//! Router assembly and the listener loop.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use chatlink_sessions::SessionRegistry;
use tokio::net::TcpListener;
use tracing::info;

use crate::application::handlers::{self, AppState};
use crate::domain::HttpConfig;

/// Builds the full route table over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/sessions",
            post(handlers::create_session).get(handlers::list_sessions),
        )
        .route(
            "/sessions/{name}",
            get(handlers::get_session).delete(handlers::logout),
        )
        .route("/sessions/{name}/qrcode", get(handlers::qr_code))
        .route("/sessions/{name}/status", get(handlers::status))
        .route("/sessions/{name}/pairing-code", post(handlers::pairing_code))
        .route("/sessions/{name}/messages", post(handlers::send_text))
        .with_state(state)
}

/// Serves the API until `shutdown` resolves, then stops every session.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn run_server(
    config: HttpConfig,
    registry: Arc<SessionRegistry>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "http surface listening");

    let app = router(AppState::new(Arc::clone(&registry), config.qr_timeout));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server failed")?;

    registry.shutdown_all().await;
    Ok(())
}
