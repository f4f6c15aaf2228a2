//! Shared TTL cache for search results.

use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Process-wide key/value store with per-entry expiry fixed at insertion.
pub struct ResponseCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    ttl: Duration,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(ttl: Duration) -> Self {
        ResponseCache {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        if let Some(entry) = self.entries.get(key) {
            if now < entry.expires_at {
                return Some(entry.value.clone());
            }
        } else {
            return None;
        }

        // Expired: drop it unless a concurrent writer refreshed it meanwhile.
        self.entries.remove_if(key, |_, entry| now >= entry.expires_at);
        None
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_at(key, value, Instant::now());
    }

    pub fn set_at(&self, key: impl Into<String>, value: V, now: Instant) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Removes every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
