//! In-memory credential store.
//!
//! Every operation runs under one async mutex, so writes for a name land in
//! call order.  Nothing survives the process.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chatlink_core::{Credentials, KeyBytes, SessionName};
use tokio::sync::Mutex;

use crate::application::credential_store::{
    CredentialStore, KeyUpdate, SessionMetadata, StoreError, StoredSession,
};

#[derive(Debug, Clone)]
struct Record {
    credentials: Credentials,
    keys: BTreeMap<String, BTreeMap<String, KeyBytes>>,
    metadata: SessionMetadata,
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    records: Mutex<BTreeMap<SessionName, Record>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, name: &SessionName) -> bool {
        self.records.lock().await.contains_key(name)
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, name: &SessionName) -> Result<StoredSession, StoreError> {
        let records = self.records.lock().await;
        let record = records
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.clone()))?;
        Ok(StoredSession {
            credentials: record.credentials.clone(),
            metadata: record.metadata,
        })
    }

    async fn save(&self, name: &SessionName, credentials: &Credentials) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        match records.get_mut(name) {
            Some(record) => {
                record.credentials = credentials.clone();
                record.metadata = record.metadata.touched();
            }
            None => {
                records.insert(
                    name.clone(),
                    Record {
                        credentials: credentials.clone(),
                        keys: BTreeMap::new(),
                        metadata: SessionMetadata::now(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn delete(&self, name: &SessionName) -> Result<(), StoreError> {
        self.records.lock().await.remove(name);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SessionName>, StoreError> {
        Ok(self.records.lock().await.keys().cloned().collect())
    }

    async fn load_keys(
        &self,
        name: &SessionName,
        category: &str,
    ) -> Result<BTreeMap<String, KeyBytes>, StoreError> {
        let records = self.records.lock().await;
        let record = records
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.clone()))?;
        Ok(record.keys.get(category).cloned().unwrap_or_default())
    }

    async fn save_keys(
        &self,
        name: &SessionName,
        updates: Vec<KeyUpdate>,
    ) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.clone()))?;
        apply_key_updates(&mut record.keys, updates);
        record.metadata = record.metadata.touched();
        Ok(())
    }
}

/// Applies inserts and deletes, dropping categories that become empty.
pub(crate) fn apply_key_updates(
    keys: &mut BTreeMap<String, BTreeMap<String, KeyBytes>>,
    updates: Vec<KeyUpdate>,
) {
    for update in updates {
        match update.value {
            Some(value) => {
                keys.entry(update.category)
                    .or_default()
                    .insert(update.id, value);
            }
            None => {
                if let Some(category) = keys.get_mut(&update.category) {
                    category.remove(&update.id);
                    if category.is_empty() {
                        keys.remove(&update.category);
                    }
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
