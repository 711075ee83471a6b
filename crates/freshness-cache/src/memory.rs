//! In-memory tier backed by `moka`
//!
//! Bounded by entry count with LRU eviction. Payloads are stored type-erased,
//! so one store serves every payload type; a read with the wrong type is a miss.

use crate::types::CacheEntry;
use chrono::{DateTime, Utc};
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub(crate) struct MemoryEntry {
    pub(crate) stored_at: DateTime<Utc>,
    pub(crate) ttl: Option<Duration>,
    payload: Arc<dyn Any + Send + Sync>,
}

impl MemoryEntry {
    pub(crate) fn is_fresh(&self, now: DateTime<Utc>, default_ttl: Duration) -> bool {
        crate::types::is_fresh(self.stored_at, self.ttl, now, default_ttl)
    }

    /// Clone the payload out as `T`, `None` if it was stored as another type
    pub(crate) fn downcast<T: Clone + 'static>(&self) -> Option<CacheEntry<T>> {
        let payload = self.payload.downcast_ref::<T>()?.clone();
        Some(CacheEntry {
            payload,
            stored_at: self.stored_at,
            ttl: self.ttl,
        })
    }
}

/// Thread-safe, size-bounded key to entry map
pub struct MemoryStore {
    cache: Cache<String, MemoryEntry>,
    capacity: u64,
}

impl MemoryStore {
    pub fn new(capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self { cache, capacity }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn insert<T: Send + Sync + 'static>(&self, key: &str, entry: CacheEntry<T>) {
        let value = MemoryEntry {
            stored_at: entry.stored_at,
            ttl: entry.ttl,
            payload: Arc::new(entry.payload),
        };
        self.cache.insert(key.to_string(), value);
    }

    pub(crate) fn get(&self, key: &str) -> Option<MemoryEntry> {
        self.cache.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }

    pub fn remove(&self, key: &str) {
        self.cache.invalidate(key);
    }

    /// Drop every entry and settle the count
    pub fn evict_all(&self) {
        let keys: Vec<Arc<String>> = self.cache.iter().map(|(key, _)| key).collect();
        for key in keys {
            self.cache.invalidate(key.as_str());
        }
        // Catches inserts that raced the scan
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
    }

    /// Apply pending evictions now instead of on moka's schedule
    pub fn run_pending_evictions(&self) {
        self.cache.run_pending_tasks();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.iter().next().is_none()
    }
}
