//! Shared fixtures for the chatlink-sessions integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chatlink_core::{Credentials, KeyBytes, SessionName};
use chatlink_sessions::application::credential_store::{KeyUpdate, StoreError, StoredSession};
use chatlink_sessions::infrastructure::engine::ScriptedEngine;
use chatlink_sessions::infrastructure::qr_render::QrCodeRenderer;
use chatlink_sessions::infrastructure::storage::MemoryCredentialStore;
use chatlink_sessions::{
    ConnectionStateMachine, CredentialStore, SessionRegistry, SessionSettings,
};

pub const WAIT: Duration = Duration::from_secs(5);

pub fn name(raw: &str) -> SessionName {
    SessionName::parse(raw).expect("valid session name")
}

/// One store operation as seen by [`RecordingStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Load(String),
    Save(String),
    Delete(String),
}

/// Wraps a [`MemoryCredentialStore`], logs every call and can be told to
/// fail saves.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryCredentialStore,
    ops: Mutex<Vec<StoreOp>>,
    fail_saves: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<StoreOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn loads(&self) -> usize {
        self.ops()
            .iter()
            .filter(|op| matches!(op, StoreOp::Load(_)))
            .count()
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    fn log(&self, op: StoreOp) {
        self.ops.lock().unwrap().push(op);
    }
}

#[async_trait]
impl CredentialStore for RecordingStore {
    async fn load(&self, name: &SessionName) -> Result<StoredSession, StoreError> {
        self.log(StoreOp::Load(name.to_string()));
        self.inner.load(name).await
    }

    async fn save(&self, name: &SessionName, credentials: &Credentials) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.log(StoreOp::Save(name.to_string()));
        self.inner.save(name, credentials).await
    }

    async fn delete(&self, name: &SessionName) -> Result<(), StoreError> {
        self.log(StoreOp::Delete(name.to_string()));
        self.inner.delete(name).await
    }

    async fn list(&self) -> Result<Vec<SessionName>, StoreError> {
        self.inner.list().await
    }

    async fn load_keys(
        &self,
        name: &SessionName,
        category: &str,
    ) -> Result<BTreeMap<String, KeyBytes>, StoreError> {
        self.inner.load_keys(name, category).await
    }

    async fn save_keys(
        &self,
        name: &SessionName,
        updates: Vec<KeyUpdate>,
    ) -> Result<(), StoreError> {
        self.inner.save_keys(name, updates).await
    }
}

pub struct Harness {
    pub registry: SessionRegistry,
    pub engine: Arc<ScriptedEngine>,
    pub store: Arc<RecordingStore>,
}

impl Harness {
    /// A machine outside the registry, for tests that must subscribe before
    /// the driver starts.
    pub fn machine(&self, raw: &str) -> ConnectionStateMachine {
        ConnectionStateMachine::new(
            name(raw),
            Arc::clone(&self.store) as Arc<dyn CredentialStore>,
            Arc::clone(&self.engine) as _,
            Arc::new(QrCodeRenderer::new()),
            self.registry.settings().clone(),
        )
    }
}

pub fn harness(settings: SessionSettings) -> Harness {
    let engine = Arc::new(ScriptedEngine::new());
    let store = Arc::new(RecordingStore::new());
    let registry = SessionRegistry::new(
        Arc::clone(&store) as Arc<dyn CredentialStore>,
        Arc::clone(&engine) as _,
        Arc::new(QrCodeRenderer::new()),
        settings,
    );
    Harness {
        registry,
        engine,
        store,
    }
}

pub fn registered(id: &str) -> Credentials {
    let mut creds = Credentials::fresh();
    creds.registered = true;
    creds.me = Some(chatlink_core::Identity::new(id));
    creds
}
