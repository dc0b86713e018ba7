//! Fixed-capacity buffer of recent broadcasts, one per domain.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One remembered broadcast.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedEvent {
    /// `group.method` of the broadcast.
    pub event: String,
    /// Broadcast payload.
    pub params: Value,
    /// RFC 3339 time the broadcast was issued.
    pub timestamp: String,
}

impl CachedEvent {
    /// Stamp a payload with the current time.
    pub fn now(event: impl Into<String>, params: Value) -> Self {
        Self {
            event: event.into(),
            params,
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }
    }
}

/// FIFO ring of the most recent broadcasts; the oldest entry is evicted
/// once `capacity` is exceeded.
pub struct RecentCache {
    capacity: usize,
    entries: Mutex<VecDeque<CachedEvent>>,
}

impl RecentCache {
    /// Create a buffer holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Append an entry, evicting from the front when full.
    pub fn push(&self, entry: CachedEvent) {
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            let _ = entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Entries oldest first.
    pub fn snapshot(&self) -> Vec<CachedEvent> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Current entry count.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing has been cached.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Maximum entry count.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
