//! Per-session signal key store handed to the protocol engine.
//!
//! Keys (pre-keys, sessions, sender keys, ...) are grouped by category and
//! addressed by id.  Reads are served from an in-memory cache that is filled
//! one category at a time from the [`CredentialStore`].  Writes go to the
//! store first and only reach the cache once persisted, so the cache never
//! holds a key that a restart would lose.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chatlink_core::{KeyBytes, SessionName};
use tokio::sync::Mutex;
use tracing::debug;

use crate::application::credential_store::{CredentialStore, KeyUpdate, StoreError};

#[derive(Default)]
struct KeyCache {
    loaded: HashSet<String>,
    entries: HashMap<String, BTreeMap<String, KeyBytes>>,
}

pub struct SessionKeyStore {
    session: SessionName,
    store: Arc<dyn CredentialStore>,
    cache: Mutex<KeyCache>,
}

impl SessionKeyStore {
    pub fn new(session: SessionName, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            session,
            store,
            cache: Mutex::new(KeyCache::default()),
        }
    }

    /// Returns the keys of `category` whose id is in `ids`.  Missing ids are
    /// simply absent from the result.
    pub async fn get(
        &self,
        category: &str,
        ids: &[&str],
    ) -> Result<BTreeMap<String, KeyBytes>, StoreError> {
        let mut cache = self.cache.lock().await;
        if !cache.loaded.contains(category) {
            let keys = match self.store.load_keys(&self.session, category).await {
                Ok(keys) => keys,
                Err(StoreError::NotFound(_)) => BTreeMap::new(),
                Err(e) => return Err(e),
            };
            debug!(session = %self.session, category, count = keys.len(), "key category loaded");
            cache.entries.insert(category.to_string(), keys);
            cache.loaded.insert(category.to_string());
        }

        let found = cache
            .entries
            .get(category)
            .map(|keys| {
                ids.iter()
                    .filter_map(|id| keys.get(*id).map(|v| ((*id).to_string(), v.clone())))
                    .collect()
            })
            .unwrap_or_default();
        Ok(found)
    }

    /// Persists `updates`, then applies them to the cache.
    pub async fn set(&self, updates: Vec<KeyUpdate>) -> Result<(), StoreError> {
        if updates.is_empty() {
            return Ok(());
        }
        let mut cache = self.cache.lock().await;
        self.store.save_keys(&self.session, updates.clone()).await?;

        for update in updates {
            // Only categories already cached are patched; others load lazily
            // from the store, which now holds the update.
            if !cache.loaded.contains(&update.category) {
                continue;
            }
            let keys = cache.entries.entry(update.category).or_default();
            match update.value {
                Some(value) => {
                    keys.insert(update.id, value);
                }
                None => {
                    keys.remove(&update.id);
                }
            }
        }
        Ok(())
    }

    /// Drops every cached key, e.g. after the session logged out.
    pub async fn clear(&self) {
        let mut cache = self.cache.lock().await;
        *cache = KeyCache::default();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
