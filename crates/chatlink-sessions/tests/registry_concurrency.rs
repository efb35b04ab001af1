//! Integration tests for SessionRegistry: one machine per name under
//! concurrent requests, rehydration and shutdown.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chatlink_core::{ConnectionState, DisconnectReason};
use chatlink_sessions::{CredentialStore, SessionError, SessionSettings};
use common::{harness, name, registered, WAIT};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_one_machine() {
    // Arrange
    let h = Arc::new(harness(SessionSettings::default()));

    // Act: 16 callers race for the same name
    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.registry.get_or_create(&name("alice")).await })
        })
        .collect();
    let mut machines = Vec::new();
    for task in tasks {
        machines.push(task.await.expect("join").expect("create"));
    }
    h.engine.wait_for_connection(1).await.expect("connect");
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Assert
    let first = &machines[0];
    assert!(machines.iter().all(|m| Arc::ptr_eq(m, first)));
    assert_eq!(h.engine.attempts(), 1, "exactly one connect");
    assert_eq!(h.store.loads(), 1, "exactly one credential load");
    first.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_different_names_connect_independently() {
    let h = Arc::new(harness(SessionSettings::default()));

    let a = {
        let h = Arc::clone(&h);
        tokio::spawn(async move { h.registry.get_or_create(&name("one")).await })
    };
    let b = {
        let h = Arc::clone(&h);
        tokio::spawn(async move { h.registry.get_or_create(&name("two")).await })
    };
    let one = a.await.expect("join").expect("create one");
    let two = b.await.expect("join").expect("create two");

    h.engine.wait_for_connection(2).await.expect("both connected");
    assert!(!Arc::ptr_eq(&one, &two));
    let (c1, c2) = (
        h.engine.wait_for_connection(1).await.expect("first"),
        h.engine.wait_for_connection(2).await.expect("second"),
    );
    let mut names = vec![c1.session.to_string(), c2.session.to_string()];
    names.sort();
    assert_eq!(names, ["one", "two"]);
    assert_eq!(h.engine.connection_count(), 2);
    h.registry.shutdown_all().await;
}

#[tokio::test]
async fn test_rehydrate_unknown_session_is_not_found() {
    let h = harness(SessionSettings::default());

    let result = h.registry.rehydrate(&name("ghost")).await;

    assert!(matches!(result, Err(SessionError::NotFound(_))));
    assert_eq!(h.engine.attempts(), 0);
    assert!(h.registry.get(&name("ghost")).await.is_none());
}

#[tokio::test]
async fn test_rehydrate_persisted_session_connects_with_stored_credentials() {
    // Arrange: credentials left by a previous process
    let h = harness(SessionSettings::default());
    let creds = registered("bob@s");
    h.store.save(&name("bob"), &creds).await.expect("seed");

    // Act
    let bob = h.registry.rehydrate(&name("bob")).await.expect("rehydrate");
    let conn = h.engine.wait_for_connection(1).await.expect("connect");

    // Assert
    assert_eq!(conn.credentials, creds);
    let again = h.registry.rehydrate(&name("bob")).await.expect("active");
    assert!(Arc::ptr_eq(&bob, &again));
    bob.shutdown().await;
}

#[tokio::test]
async fn test_logged_out_machine_is_replaced_on_next_request() {
    // Arrange
    let h = harness(SessionSettings::default());
    let old = h.registry.get_or_create(&name("carol")).await.expect("create");
    let conn = h.engine.wait_for_connection(1).await.expect("connect");
    conn.close(DisconnectReason::LoggedOut).await;
    old.wait_for_state(ConnectionState::ClosedLoggedOut, WAIT)
        .await
        .expect("logged out");

    // Act
    let new = h.registry.get_or_create(&name("carol")).await.expect("recreate");

    // Assert: a fresh machine, pairing from scratch
    assert!(!Arc::ptr_eq(&old, &new));
    let conn = h.engine.wait_for_connection(2).await.expect("reconnect");
    assert!(!conn.credentials.registered);
    assert_ne!(new.status().connection_state, ConnectionState::ClosedLoggedOut);
    new.shutdown().await;
}

#[tokio::test]
async fn test_list_is_sorted_by_name() {
    let h = harness(SessionSettings::default());
    for raw in ["zed", "amy", "mo"] {
        h.registry.get_or_create(&name(raw)).await.expect("create");
    }

    let names: Vec<String> = h
        .registry
        .list()
        .await
        .into_iter()
        .map(|s| s.session_name.to_string())
        .collect();

    assert_eq!(names, ["amy", "mo", "zed"]);
    h.registry.shutdown_all().await;
}

#[tokio::test]
async fn test_persisted_lists_stored_sessions() {
    let h = harness(SessionSettings::default());
    h.store.save(&name("b"), &registered("b@s")).await.expect("seed");
    h.store.save(&name("a"), &registered("a@s")).await.expect("seed");

    let persisted = h.registry.persisted().await.expect("list");

    assert_eq!(persisted, vec![name("a"), name("b")]);
}

#[tokio::test]
async fn test_remove_keeps_credentials() {
    let h = harness(SessionSettings::default());
    h.store.save(&name("dan"), &registered("dan@s")).await.expect("seed");
    h.registry.get_or_create(&name("dan")).await.expect("create");
    h.engine.wait_for_connection(1).await.expect("connect");

    assert!(h.registry.remove(&name("dan")).await);

    assert!(h.registry.get(&name("dan")).await.is_none());
    assert!(h.store.load(&name("dan")).await.is_ok());
    assert!(!h.registry.remove(&name("dan")).await);
}

#[tokio::test]
async fn test_shutdown_all_closes_every_socket() {
    // Arrange
    let h = harness(SessionSettings::default());
    h.registry.get_or_create(&name("e1")).await.expect("create");
    h.registry.get_or_create(&name("e2")).await.expect("create");
    let c1 = h.engine.wait_for_connection(1).await.expect("connect 1");
    let c2 = h.engine.wait_for_connection(2).await.expect("connect 2");

    // Act
    h.registry.shutdown_all().await;

    // Assert
    assert!(c1.socket.is_closed());
    assert!(c2.socket.is_closed());
    assert!(h.registry.list().await.is_empty());
}
