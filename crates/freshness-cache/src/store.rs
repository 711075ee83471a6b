//! Cache facade over the memory and disk tiers

use crate::clock::Clock;
use crate::codec::EntryCodec;
use crate::config::CacheConfig;
use crate::disk::DiskStore;
use crate::error::{CacheError, Result};
use crate::guard::DiskSpaceGuard;
use crate::janitor::Janitor;
use crate::memory::MemoryStore;
use crate::types::{CacheEntry, CacheStats};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};

/// Two-tier TTL cache.
///
/// `save` is fire-and-forget: it lands in memory before returning and is
/// persisted to disk in the background. `load` never touches the network and
/// reports every kind of miss as an error so the caller can decide to fetch.
pub struct CacheStore {
    memory: MemoryStore,
    /// `None` when the cache directory could not be created
    disk: Option<DiskStore>,
    guard: DiskSpaceGuard,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    caching_enabled: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    writes_skipped: AtomicU64,
}

impl CacheStore {
    /// Open the cache, creating its directory.
    ///
    /// If the directory can't be created the store still comes up, but every
    /// operation is a no-op or a `CacheCatalogNotFound` miss for its lifetime.
    pub async fn open(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let guard = DiskSpaceGuard::new(config.cache_dir.clone(), config.min_free_space);
        Self::open_with_guard(config, clock, guard).await
    }

    pub async fn open_with_guard(
        config: &CacheConfig,
        clock: Arc<dyn Clock>,
        guard: DiskSpaceGuard,
    ) -> Self {
        let disk = match fs::create_dir_all(&config.cache_dir).await {
            Ok(()) => {
                info!(cache_dir = ?config.cache_dir, "Cache initialized");
                Some(DiskStore::spawn(config.cache_dir.clone()))
            }
            Err(e) => {
                warn!(cache_dir = ?config.cache_dir, error = %e, "Cache directory unavailable, caching disabled");
                None
            }
        };

        Self {
            memory: MemoryStore::new(config.memory_capacity),
            disk,
            guard,
            clock,
            default_ttl: config.default_ttl,
            caching_enabled: AtomicBool::new(true),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes_skipped: AtomicU64::new(0),
        }
    }

    /// Store a payload. Silently skipped when caching is disabled, the
    /// catalog is missing, or the disk is short on space.
    pub fn save<T>(&self, key: &str, payload: T, ttl: Option<Duration>)
    where
        T: Serialize + Send + Sync + 'static,
    {
        if !self.caching_enabled.load(Ordering::Acquire) {
            debug!(key = %key, "Caching disabled, skipping save");
            return;
        }
        let Some(disk) = &self.disk else {
            debug!(key = %key, "No cache catalog, skipping save");
            return;
        };
        if !self.guard.has_enough_space() {
            self.writes_skipped.fetch_add(1, Ordering::Relaxed);
            warn!(key = %key, min_free = self.guard.min_free(), "Not enough disk space, skipping save");
            return;
        }

        let entry = CacheEntry {
            payload,
            stored_at: self.clock.now(),
            ttl,
        };
        let bytes = match EntryCodec::encode(&entry.envelope(key), &entry.payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode cache entry");
                return;
            }
        };

        self.memory.insert(key, entry);
        disk.write(key, bytes);
        debug!(key = %key, "Cached entry");
    }

    /// Look a key up in memory, then on disk
    pub async fn load<T>(&self, key: &str) -> Result<CacheEntry<T>>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let Some(disk) = &self.disk else {
            return Err(CacheError::CacheCatalogNotFound);
        };
        let now = self.clock.now();

        if let Some(cached) = self.memory.get(key) {
            if !cached.is_fresh(now, self.default_ttl) {
                debug!(key = %key, "Memory entry expired");
                self.memory.remove(key);
            } else if let Some(entry) = cached.downcast::<T>() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Memory cache hit");
                return Ok(entry);
            }
            // Stored under another type; the disk copy decodes as anything
        }

        // The memory copy may be gone before its queued write lands
        if disk.has_pending_write(key) {
            disk.flush().await;
        }
        let bytes = match disk.read(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Err(self.miss(key, "absent")),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read cached file");
                return Err(self.miss(key, "unreadable"));
            }
        };

        let (envelope, payload) = match EntryCodec::decode::<T>(&bytes) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!(key = %key, error = %e, "Undecodable cache entry");
                return Err(self.miss(key, "undecodable"));
            }
        };
        if envelope.key != key {
            return Err(self.miss(key, "key mismatch"));
        }

        if !envelope.is_fresh(now, self.default_ttl) {
            let path = disk.path_for(key);
            if let Err(e) = disk.remove_if_expired(path, now, self.default_ttl).await {
                warn!(key = %key, error = %e, "Failed to remove expired cache entry");
            }
            return Err(self.miss(key, "expired"));
        }

        let entry = CacheEntry {
            payload,
            stored_at: envelope.stored_at,
            ttl: envelope.ttl(),
        };
        if self.caching_enabled.load(Ordering::Acquire) {
            self.memory.insert(key, entry.clone());
        }
        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "Disk cache hit");
        Ok(entry)
    }

    /// Remove a key from both tiers. Idempotent.
    pub async fn clear(&self, key: &str) {
        self.memory.remove(key);
        if let Some(disk) = &self.disk {
            disk.remove(key).await;
        }
    }

    /// Empty memory and delete every entry file
    pub async fn reset(&self) {
        self.memory.evict_all();
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.purge().await {
                warn!(dir = ?disk.dir(), error = %e, "Failed to purge cache directory");
            }
        }
        info!("Cache reset");
    }

    /// Wait until every queued disk write has landed
    pub async fn flush(&self) {
        if let Some(disk) = &self.disk {
            disk.flush().await;
        }
    }

    /// Low-memory response: drop the memory tier and stop accepting saves
    pub fn handle_memory_pressure(&self) {
        self.memory.evict_all();
        self.caching_enabled.store(false, Ordering::Release);
        warn!("Memory pressure: memory cache emptied, caching disabled");
    }

    /// Accept saves again after a memory-pressure shutdown
    pub fn enable_caching(&self) {
        self.caching_enabled.store(true, Ordering::Release);
        info!("Caching re-enabled");
    }

    pub fn is_caching_enabled(&self) -> bool {
        self.caching_enabled.load(Ordering::Acquire)
    }

    pub fn has_catalog(&self) -> bool {
        self.disk.is_some()
    }

    /// A janitor over this store's disk tier, `None` without a catalog
    pub fn janitor(&self, interval: Duration) -> Option<Janitor> {
        let disk = self.disk.clone()?;
        Some(Janitor::new(
            disk,
            Arc::clone(&self.clock),
            self.default_ttl,
            interval,
        ))
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn space_guard(&self) -> &DiskSpaceGuard {
        &self.guard
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_entries: self.memory.entry_count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes_skipped: self.writes_skipped.load(Ordering::Relaxed),
        }
    }

    fn miss(&self, key: &str, reason: &'static str) -> CacheError {
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, reason, "Cache miss");
        CacheError::EmptyOrStale
    }
}
