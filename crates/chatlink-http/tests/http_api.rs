//! In-process tests of the HTTP surface.
//!
//! Requests go through the real router with `tower::ServiceExt::oneshot`;
//! the protocol engine is scripted so each test decides what the network
//! does.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chatlink_core::{DisconnectReason, SessionName};
use chatlink_http::{router, AppState};
use chatlink_sessions::infrastructure::engine::{ScriptedEngine, SocketCall};
use chatlink_sessions::infrastructure::qr_render::QrCodeRenderer;
use chatlink_sessions::infrastructure::storage::MemoryCredentialStore;
use chatlink_sessions::{CredentialStore, SessionRegistry, SessionSettings};
use serde_json::{json, Value};
use tower::ServiceExt;

const WAIT: Duration = Duration::from_secs(5);

struct TestApp {
    app: Router,
    registry: Arc<SessionRegistry>,
    engine: Arc<ScriptedEngine>,
    store: Arc<MemoryCredentialStore>,
}

fn test_app() -> TestApp {
    let engine = Arc::new(ScriptedEngine::new());
    let store = Arc::new(MemoryCredentialStore::new());
    let settings = SessionSettings::default();
    let registry = Arc::new(SessionRegistry::new(
        Arc::clone(&store) as Arc<dyn CredentialStore>,
        Arc::clone(&engine) as _,
        Arc::new(QrCodeRenderer::new()),
        settings.clone(),
    ));
    let app = router(AppState::new(Arc::clone(&registry), settings.qr_timeout));
    TestApp {
        app,
        registry,
        engine,
        store,
    }
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, value)
}

fn name(raw: &str) -> SessionName {
    SessionName::parse(raw).unwrap()
}

// ── Session creation ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_returns_ok() {
    let t = test_app();

    let (status, body) = send(&t.app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".to_string()));
}

#[tokio::test]
async fn test_create_session_starts_connection() {
    // Arrange
    let t = test_app();

    // Act
    let (status, body) = send(
        &t.app,
        "POST",
        "/sessions",
        Some(json!({ "sessionName": "alice" })),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "sessionName": "alice" }));
    assert!(t.engine.wait_for_connection(1).await.is_some());
    t.registry.shutdown_all().await;
}

#[tokio::test]
async fn test_create_session_rejects_invalid_name() {
    let t = test_app();

    let (status, body) = send(&t.app, "POST", "/sessions", Some(json!({ "sessionName": "" }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadRequest");
    assert_eq!(t.engine.attempts(), 0);
}

#[tokio::test]
async fn test_list_sessions_reports_states() {
    let t = test_app();
    send(&t.app, "POST", "/sessions", Some(json!({ "sessionName": "b" }))).await;
    send(&t.app, "POST", "/sessions", Some(json!({ "sessionName": "a" }))).await;

    let (status, body) = send(&t.app, "GET", "/sessions", None).await;

    assert_eq!(status, StatusCode::OK);
    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0]["sessionName"], "a");
    assert!(sessions[0]["connectionState"].is_string());
    t.registry.shutdown_all().await;
}

// ── Rehydration ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_unknown_session_is_404() {
    let t = test_app();

    let (status, body) = send(&t.app, "GET", "/sessions/ghost", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");
    assert_eq!(t.engine.attempts(), 0);
}

#[tokio::test]
async fn test_persisted_session_is_rehydrated() {
    // Arrange: credentials left on disk by an earlier process
    let t = test_app();
    let mut creds = chatlink_core::Credentials::fresh();
    creds.registered = true;
    t.store.save(&name("bob"), &creds).await.unwrap();

    // Act
    let (status, body) = send(&t.app, "GET", "/sessions/bob", None).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessionName"], "bob");
    assert_eq!(body["registered"], true);
    let conn = t.engine.wait_for_connection(1).await.unwrap();
    assert_eq!(conn.credentials, creds);
    t.registry.shutdown_all().await;
}

// ── Pairing ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_qrcode_returns_rendered_challenge() {
    // Arrange
    let t = test_app();
    send(&t.app, "POST", "/sessions", Some(json!({ "sessionName": "carol" }))).await;
    let conn = t.engine.wait_for_connection(1).await.unwrap();
    conn.challenge("2@abc,def,ghi,jkl").await;

    // Act
    let (status, body) = send(&t.app, "GET", "/sessions/carol/qrcode", None).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payload"], "2@abc,def,ghi,jkl");
    assert!(body["qrCode"]
        .as_str()
        .unwrap()
        .starts_with("data:image/svg+xml;base64,"));
    t.registry.shutdown_all().await;
}

#[tokio::test(start_paused = true)]
async fn test_qrcode_on_paired_session_times_out_with_408() {
    // Arrange: an open session never issues another challenge
    let t = test_app();
    send(&t.app, "POST", "/sessions", Some(json!({ "sessionName": "dave" }))).await;
    let conn = t.engine.wait_for_connection(1).await.unwrap();
    conn.open("dave@s").await;
    let machine = t.registry.get(&name("dave")).await.unwrap();
    machine
        .wait_for_state(chatlink_core::ConnectionState::Open, WAIT)
        .await
        .unwrap();
    let started = tokio::time::Instant::now();

    // Act
    let (status, body) = send(&t.app, "GET", "/sessions/dave/qrcode", None).await;

    // Assert
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(body["error"], "Timeout");
    assert!(started.elapsed() >= Duration::from_secs(15));
    assert!(started.elapsed() < Duration::from_secs(16));
    t.registry.shutdown_all().await;
}

#[tokio::test]
async fn test_pairing_code_is_returned_before_registration() {
    let t = test_app();
    send(&t.app, "POST", "/sessions", Some(json!({ "sessionName": "erin" }))).await;
    let conn = t.engine.wait_for_connection(1).await.unwrap();
    conn.challenge("ref").await;
    send(&t.app, "GET", "/sessions/erin/qrcode", None).await;

    let (status, body) = send(
        &t.app,
        "POST",
        "/sessions/erin/pairing-code",
        Some(json!({ "phoneNumber": "+55 11 99999 9999" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], "ABCD1234");
    assert!(conn
        .socket
        .calls()
        .contains(&SocketCall::PairingCode("+55 11 99999 9999".to_string())));
    t.registry.shutdown_all().await;
}

#[tokio::test]
async fn test_pairing_code_without_digits_is_bad_request() {
    let t = test_app();

    let (status, _) = send(
        &t.app,
        "POST",
        "/sessions/erin/pairing-code",
        Some(json!({ "phoneNumber": "none" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ── Status, messages and logout ───────────────────────────────────────────────

#[tokio::test]
async fn test_status_reports_state_and_identity() {
    // Arrange
    let t = test_app();
    send(&t.app, "POST", "/sessions", Some(json!({ "sessionName": "frank" }))).await;
    let conn = t.engine.wait_for_connection(1).await.unwrap();
    conn.open("frank@s").await;
    t.registry
        .get(&name("frank"))
        .await
        .unwrap()
        .wait_for_state(chatlink_core::ConnectionState::Open, WAIT)
        .await
        .unwrap();

    // Act
    let (status, body) = send(&t.app, "GET", "/sessions/frank/status", None).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "connectionState": "OPEN", "identity": { "id": "frank@s" } })
    );
    t.registry.shutdown_all().await;
}

#[tokio::test]
async fn test_send_message_requires_open_session() {
    // Arrange
    let t = test_app();
    send(&t.app, "POST", "/sessions", Some(json!({ "sessionName": "gina" }))).await;
    let conn = t.engine.wait_for_connection(1).await.unwrap();
    let message = json!({ "jid": "bob@s", "text": "hi" });

    // Act / Assert: not open yet
    let (status, body) = send(&t.app, "POST", "/sessions/gina/messages", Some(message.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "NotConnected");

    conn.open("gina@s").await;
    t.registry
        .get(&name("gina"))
        .await
        .unwrap()
        .wait_for_state(chatlink_core::ConnectionState::Open, WAIT)
        .await
        .unwrap();
    let (status, body) = send(&t.app, "POST", "/sessions/gina/messages", Some(message)).await;

    // Assert
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["jid"], "bob@s");
    assert!(!body["id"].as_str().unwrap().is_empty());
    t.registry.shutdown_all().await;
}

#[tokio::test]
async fn test_delete_logs_out_and_purges() {
    // Arrange
    let t = test_app();
    send(&t.app, "POST", "/sessions", Some(json!({ "sessionName": "hank" }))).await;
    let conn = t.engine.wait_for_connection(1).await.unwrap();
    conn.open("hank@s").await;
    t.registry
        .get(&name("hank"))
        .await
        .unwrap()
        .wait_for_state(chatlink_core::ConnectionState::Open, WAIT)
        .await
        .unwrap();

    // Act
    let (status, body) = send(&t.app, "DELETE", "/sessions/hank", None).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connectionState"], "CLOSED_LOGGED_OUT");
    assert!(conn.socket.calls().contains(&SocketCall::Logout));
    assert!(!t.store.contains(&name("hank")).await);
    let (status, _) = send(&t.app, "GET", "/sessions/hank", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_remote_unlink_is_reported_through_status() {
    let t = test_app();
    send(&t.app, "POST", "/sessions", Some(json!({ "sessionName": "ivy" }))).await;
    let conn = t.engine.wait_for_connection(1).await.unwrap();
    let machine = t.registry.get(&name("ivy")).await.unwrap();

    conn.close(DisconnectReason::LoggedOut).await;
    machine
        .wait_for_state(chatlink_core::ConnectionState::ClosedLoggedOut, WAIT)
        .await
        .unwrap();

    // The purged session is gone; asking for it again needs a new session.
    let (status, _) = send(&t.app, "GET", "/sessions/ivy/status", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
