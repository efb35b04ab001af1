//! File-backed credential store.
//!
//! One JSON document per session, `{dir}/{session}.json`:
//!
//! ```json
//! {
//!   "sessionName": "alice",
//!   "credentials": { "noiseKey": { "public": "base64…", … }, … },
//!   "keys": { "pre-key": { "1": "base64…" } },
//!   "metadata": { "createdAt": 1700000000, "updatedAt": 1700000042 }
//! }
//! ```
//!
//! Writes go to a temporary file that is renamed over the record, so a
//! crash mid-write leaves the previous record intact.  Operations on the
//! same name are serialized through a per-name async lock; different names
//! never wait on each other.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chatlink_core::{Credentials, KeyBytes, SessionName};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::application::credential_store::{
    CredentialStore, KeyUpdate, SessionMetadata, StoreError, StoredSession,
};
use crate::infrastructure::storage::memory::apply_key_updates;

const RECORD_EXTENSION: &str = "json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionRecord {
    session_name: SessionName,
    credentials: Credentials,
    #[serde(default)]
    keys: BTreeMap<String, BTreeMap<String, KeyBytes>>,
    metadata: SessionMetadata,
}

pub struct FileCredentialStore {
    dir: PathBuf,
    locks: Mutex<HashMap<SessionName, Arc<tokio::sync::Mutex<()>>>>,
}

impl FileCredentialStore {
    /// Uses `dir` for records; it is created on the first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, name: &SessionName) -> PathBuf {
        self.dir.join(format!("{name}.{RECORD_EXTENSION}"))
    }

    fn lock_for(&self, name: &SessionName) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        Arc::clone(locks.entry(name.clone()).or_default())
    }

    /// Drops the lock entry of `name` unless another caller still holds it.
    fn release_lock(&self, name: &SessionName, lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        if Arc::strong_count(lock) <= 2 {
            locks.remove(name);
        }
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    async fn read_record(&self, name: &SessionName) -> Result<Option<SessionRecord>, StoreError> {
        let path = self.record_path(name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e)),
        };
        let record = serde_json::from_slice(&bytes).map_err(|e| StoreError::Deserialize {
            session: name.clone(),
            reason: e.to_string(),
        })?;
        Ok(Some(record))
    }

    async fn write_record(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let json =
            serde_json::to_vec_pretty(record).map_err(|e| StoreError::Serialize(e.to_string()))?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.record_path(&record.session_name);
        let tmp = path.with_extension(format!("{RECORD_EXTENSION}.tmp"));
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(session = %record.session_name, path = %path.display(), "session record written");
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self, name: &SessionName) -> Result<StoredSession, StoreError> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;
        let record = self
            .read_record(name)
            .await?
            .ok_or_else(|| StoreError::NotFound(name.clone()))?;
        Ok(StoredSession {
            credentials: record.credentials,
            metadata: record.metadata,
        })
    }

    async fn save(&self, name: &SessionName, credentials: &Credentials) -> Result<(), StoreError> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;
        let record = match self.read_record(name).await {
            Ok(Some(mut record)) => {
                record.credentials = credentials.clone();
                record.metadata = record.metadata.touched();
                record
            }
            Ok(None) => SessionRecord {
                session_name: name.clone(),
                credentials: credentials.clone(),
                keys: BTreeMap::new(),
                metadata: SessionMetadata::now(),
            },
            // A corrupt record is replaced; the blob is complete on its own.
            Err(StoreError::Deserialize { reason, .. }) => {
                warn!(session = %name, %reason, "replacing unreadable session record");
                SessionRecord {
                    session_name: name.clone(),
                    credentials: credentials.clone(),
                    keys: BTreeMap::new(),
                    metadata: SessionMetadata::now(),
                }
            }
            Err(e) => return Err(e),
        };
        self.write_record(&record).await
    }

    async fn delete(&self, name: &SessionName) -> Result<(), StoreError> {
        let lock = self.lock_for(name);
        let guard = lock.lock().await;
        let removed = match tokio::fs::remove_file(self.record_path(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        };
        drop(guard);
        self.release_lock(name, &lock);
        removed
    }

    async fn list(&self) -> Result<Vec<SessionName>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(e)),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match SessionName::parse(stem) {
                Ok(name) => names.push(name),
                Err(e) => debug!(file = %path.display(), error = %e, "skipping foreign file"),
            }
        }
        names.sort();
        Ok(names)
    }

    async fn load_keys(
        &self,
        name: &SessionName,
        category: &str,
    ) -> Result<BTreeMap<String, KeyBytes>, StoreError> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;
        let record = self
            .read_record(name)
            .await?
            .ok_or_else(|| StoreError::NotFound(name.clone()))?;
        Ok(record.keys.get(category).cloned().unwrap_or_default())
    }

    async fn save_keys(
        &self,
        name: &SessionName,
        updates: Vec<KeyUpdate>,
    ) -> Result<(), StoreError> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;
        let mut record = self
            .read_record(name)
            .await?
            .ok_or_else(|| StoreError::NotFound(name.clone()))?;
        apply_key_updates(&mut record.keys, updates);
        record.metadata = record.metadata.touched();
        self.write_record(&record).await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
