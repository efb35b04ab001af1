//! CredentialStore: durable per-session persistence of authentication material.
//!
//! Each session name owns one record:
//!
//! ```text
//! SessionRecord
//!  ├─ credentials   full blob, replaced on every save
//!  ├─ keys          category → id → key bytes (signal key store)
//!  └─ metadata      created_at / updated_at
//! ```
//!
//! Connection state is never part of the record; it is recomputed on start.
//!
//! Implementations must serialize writes for the same name so that saves
//! land in the order the credential-update events produced them.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chatlink_core::{Credentials, KeyBytes, SessionName};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a credential store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Nothing is persisted under this name.
    #[error("no persisted credentials for session {0}")]
    NotFound(SessionName),

    #[error("I/O error on credential store: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode session record: {0}")]
    Serialize(String),

    #[error("failed to decode session record for {session}: {reason}")]
    Deserialize { session: SessionName, reason: String },
}

/// Bookkeeping stored next to the credential blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    /// Seconds since the Unix epoch.
    pub created_at: u64,
    pub updated_at: u64,
}

impl SessionMetadata {
    pub fn now() -> Self {
        let now = unix_now();
        Self {
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touched(self) -> Self {
        Self {
            updated_at: unix_now(),
            ..self
        }
    }
}

/// What [`CredentialStore::load`] returns.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub credentials: Credentials,
    pub metadata: SessionMetadata,
}

/// One key-store mutation.  `value: None` deletes the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyUpdate {
    pub category: String,
    pub id: String,
    pub value: Option<KeyBytes>,
}

/// Durable key/value persistence for session credentials.
///
/// In-memory and file-backed implementations live in
/// `infrastructure::storage`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Loads the credential blob of `name`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when nothing is persisted.
    async fn load(&self, name: &SessionName) -> Result<StoredSession, StoreError>;

    /// Replaces the credential blob of `name`, creating the record if needed.
    async fn save(&self, name: &SessionName, credentials: &Credentials) -> Result<(), StoreError>;

    /// Removes the record of `name` including its keys.  Removing a missing
    /// record is not an error.
    async fn delete(&self, name: &SessionName) -> Result<(), StoreError>;

    /// Names of all persisted sessions, sorted.
    async fn list(&self) -> Result<Vec<SessionName>, StoreError>;

    /// Loads every key of `category`.
    async fn load_keys(
        &self,
        name: &SessionName,
        category: &str,
    ) -> Result<BTreeMap<String, KeyBytes>, StoreError>;

    /// Applies a batch of key mutations atomically.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the session has no record yet.
    async fn save_keys(
        &self,
        name: &SessionName,
        updates: Vec<KeyUpdate>,
    ) -> Result<(), StoreError>;
}

pub(crate) fn unix_now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
