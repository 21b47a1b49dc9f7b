//! Keyed status channel with duplicate suppression

use std::collections::HashMap;

use tracing::debug;

use crate::event::{StatusKey, StatusUpdate};

#[derive(Debug, Clone)]
struct LastStatus {
    message: String,
    published_ms: u64,
}

/// Remembers the last message per key
#[derive(Debug)]
pub struct StatusBoard {
    cooldown_ms: u64,
    last: HashMap<StatusKey, LastStatus>,
}

impl StatusBoard {
    pub fn new(cooldown_ms: u64) -> Self {
        Self {
            cooldown_ms,
            last: HashMap::new(),
        }
    }

    /// Returns the update to publish, or `None` when the same message went
    /// out on this key within the cooldown
    pub fn publish(&mut self, now_ms: u64, key: StatusKey, message: impl Into<String>) -> Option<StatusUpdate> {
        let message = message.into();
        if let Some(last) = self.last.get(&key) {
            if last.message == message && now_ms.saturating_sub(last.published_ms) < self.cooldown_ms {
                debug!("Status suppressed: {:?} in cooldown", key);
                return None;
            }
        }

        self.last.insert(
            key,
            LastStatus {
                message: message.clone(),
                published_ms: now_ms,
            },
        );
        Some(StatusUpdate { key, message })
    }

    /// Latest message for `key`
    pub fn current(&self, key: StatusKey) -> Option<&str> {
        self.last.get(&key).map(|s| s.message.as_str())
    }

    pub fn clear(&mut self) {
        self.last.clear();
    }
}
