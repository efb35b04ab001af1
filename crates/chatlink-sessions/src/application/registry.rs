//! SessionRegistry: exactly one ConnectionStateMachine per session name.
//!
//! The map holds a `OnceCell` slot per name.  The map lock is only held to
//! find or insert the slot; construction (including the credential preload)
//! runs inside `get_or_try_init`, so concurrent callers for the same name
//! await a single creation while other names proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use chatlink_core::SessionName;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use crate::application::connection::{ConnectionStateMachine, SessionSettings, SessionStatus};
use crate::application::credential_store::{CredentialStore, StoreError};
use crate::application::engine::ProtocolEngine;
use crate::application::error::SessionError;
use crate::application::qr_issuer::ChallengeRenderer;

type Slot = Arc<OnceCell<Arc<ConnectionStateMachine>>>;

pub struct SessionRegistry {
    store: Arc<dyn CredentialStore>,
    engine: Arc<dyn ProtocolEngine>,
    renderer: Arc<dyn ChallengeRenderer>,
    settings: SessionSettings,
    sessions: Mutex<HashMap<SessionName, Slot>>,
}

impl SessionRegistry {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        engine: Arc<dyn ProtocolEngine>,
        renderer: Arc<dyn ChallengeRenderer>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            store,
            engine,
            renderer,
            settings,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Returns the running machine for `name`, creating and starting it on
    /// first use.  A logged-out machine is replaced by a new one.
    ///
    /// # Errors
    ///
    /// [`SessionError::Persistence`] when the credential preload fails.
    pub async fn get_or_create(
        &self,
        name: &SessionName,
    ) -> Result<Arc<ConnectionStateMachine>, SessionError> {
        let slot = {
            let mut sessions = self.sessions.lock().await;
            let logged_out = sessions
                .get(name)
                .and_then(|slot| slot.get())
                .is_some_and(|m| m.status().connection_state.is_terminal());
            if logged_out {
                debug!(session = %name, "replacing logged-out session");
                sessions.remove(name);
            }
            Arc::clone(sessions.entry(name.clone()).or_default())
        };

        let machine = slot
            .get_or_try_init(|| async {
                let machine = Arc::new(ConnectionStateMachine::new(
                    name.clone(),
                    Arc::clone(&self.store),
                    Arc::clone(&self.engine),
                    Arc::clone(&self.renderer),
                    self.settings.clone(),
                ));
                machine.preload_credentials().await?;
                info!(session = %name, "session created");
                Ok::<_, SessionError>(machine)
            })
            .await?;

        machine.start().await?;
        Ok(Arc::clone(machine))
    }

    /// Returns the active machine for `name`, or starts one from persisted
    /// credentials.  A logged-out machine does not count as active.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotFound`] when the session is neither active nor
    /// persisted.
    pub async fn rehydrate(
        &self,
        name: &SessionName,
    ) -> Result<Arc<ConnectionStateMachine>, SessionError> {
        let active = self
            .get(name)
            .await
            .filter(|m| !m.status().connection_state.is_terminal());
        if let Some(machine) = active {
            return Ok(machine);
        }
        match self.store.load(name).await {
            Ok(_) => self.get_or_create(name).await,
            Err(StoreError::NotFound(_)) => Err(SessionError::NotFound(name.clone())),
            Err(e) => Err(SessionError::Persistence(e)),
        }
    }

    /// The active machine for `name`, without creating one.
    pub async fn get(&self, name: &SessionName) -> Option<Arc<ConnectionStateMachine>> {
        let sessions = self.sessions.lock().await;
        sessions.get(name).and_then(|slot| slot.get()).cloned()
    }

    /// Status of every active machine, sorted by name.
    pub async fn list(&self) -> Vec<SessionStatus> {
        let machines: Vec<Arc<ConnectionStateMachine>> = {
            let sessions = self.sessions.lock().await;
            sessions.values().filter_map(|slot| slot.get().cloned()).collect()
        };
        let mut statuses: Vec<SessionStatus> = machines.iter().map(|m| m.status()).collect();
        statuses.sort_by(|a, b| a.session_name.cmp(&b.session_name));
        statuses
    }

    /// Names with persisted credentials, whether active or not.
    pub async fn persisted(&self) -> Result<Vec<SessionName>, SessionError> {
        self.store.list().await.map_err(SessionError::Persistence)
    }

    /// Shuts down and forgets the machine for `name`.  Persisted credentials
    /// are kept.  Returns `false` when nothing was active.
    pub async fn remove(&self, name: &SessionName) -> bool {
        let slot = self.sessions.lock().await.remove(name);
        match slot.and_then(|slot| slot.get().cloned()) {
            Some(machine) => {
                machine.shutdown().await;
                true
            }
            None => false,
        }
    }

    /// Stops every session; used on process shutdown.
    pub async fn shutdown_all(&self) {
        let slots: Vec<(SessionName, Slot)> = self.sessions.lock().await.drain().collect();
        for (name, slot) in slots {
            if let Some(machine) = slot.get() {
                debug!(session = %name, "stopping session");
                machine.shutdown().await;
            }
        }
        info!("all sessions stopped");
    }
}
