//! Bounded cache of recent message contents.
//!
//! The engine asks for the content of a message it has to re-encrypt for a
//! device that failed to decrypt it.  Every upserted and every outbound
//! message is recorded here; the oldest entries are evicted first.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chatlink_core::protocol::events::{MessageContent, MessageKey, WireMessage};

use crate::application::engine::MessageResolver;

pub const DEFAULT_MESSAGE_CACHE_CAPACITY: usize = 1024;

#[derive(Default)]
struct Entries {
    contents: HashMap<MessageKey, MessageContent>,
    order: VecDeque<MessageKey>,
}

pub struct MessageCache {
    capacity: usize,
    entries: Mutex<Entries>,
}

impl MessageCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(Entries::default()),
        }
    }

    /// Records `message` if it has content.  Re-recording a key replaces the
    /// content but keeps its original eviction position.
    pub fn record(&self, message: &WireMessage) {
        let Some(content) = &message.content else {
            return;
        };
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        if entries
            .contents
            .insert(message.key.clone(), content.clone())
            .is_none()
        {
            entries.order.push_back(message.key.clone());
        }
        while entries.order.len() > self.capacity {
            if let Some(oldest) = entries.order.pop_front() {
                entries.contents.remove(&oldest);
            }
        }
    }

    pub fn get(&self, key: &MessageKey) -> Option<MessageContent> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.contents.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .order
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MessageCache {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_CACHE_CAPACITY)
    }
}

#[async_trait]
impl MessageResolver for MessageCache {
    async fn resolve_historical_message(&self, key: &MessageKey) -> Option<MessageContent> {
        self.get(key)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
