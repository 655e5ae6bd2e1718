//! In-process TTL caching for read-path data.
//!
//! Every list and detail read the service exposes is fronted by a named
//! [`TtlCache`]: a key-value store with per-entry expiry, hit counters,
//! popularity-weighted eviction, and substring-based bulk invalidation.
//! Caches are strictly derived state; the relational store stays
//! authoritative and every write path pairs its commit with an
//! invalidation here.
//!
//! # Example
//!
//! ```ignore
//! use sarpras_core::cache::{CacheConfig, TtlCache};
//! use sarpras_core::clock::system_clock;
//! use std::time::Duration;
//!
//! # async fn demo() {
//! let cache = TtlCache::new("barang", CacheConfig::default(), system_clock());
//!
//! cache.set("barang:all", b"[]".to_vec(), None).await;
//! let value = cache.get("barang:all").await;
//!
//! // Populate-on-miss; concurrent callers for the same key produce once.
//! let value = cache
//!     .get_or_set("barang:detail:1", Some(Duration::from_secs(600)), || async {
//!         Ok(b"{}".to_vec())
//!     })
//!     .await;
//! # }
//! ```

mod error;
mod key;
pub mod registry;
pub mod sweeper;
mod types;

pub use error::{CacheError, CacheResult};
pub use key::cache_key;
pub use registry::CacheRegistry;
pub use sweeper::spawn_sweeper;
pub use types::{CacheConfig, CacheEntry, CacheStats};

use crate::clock::SharedClock;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// A named in-memory cache with per-entry TTL and bounded capacity.
///
/// # Thread safety
///
/// Uses `tokio::sync::RwLock` for the entry map and a per-key
/// `tokio::sync::Mutex` during `get_or_set` so that concurrent misses for
/// one key run the producer once.
pub struct TtlCache {
    /// Logical domain this cache serves (e.g. `barang`, `peminjaman`).
    name: String,
    config: CacheConfig,
    /// The cache data store.
    data: RwLock<HashMap<String, CacheEntry>>,
    /// Per-key locks for get_or_set operations.
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Cache hit counter.
    hits: AtomicU64,
    /// Cache miss counter.
    misses: AtomicU64,
    clock: SharedClock,
}

impl TtlCache {
    /// Creates a new cache for the given domain.
    pub fn new(name: impl Into<String>, config: CacheConfig, clock: SharedClock) -> Self {
        Self {
            name: name.into(),
            config,
            data: RwLock::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            clock,
        }
    }

    /// Returns the cache's domain name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the cache's configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Gets a value by key.
    ///
    /// An entry whose expiry has passed is removed and reported as a miss;
    /// a `get` never returns stale data regardless of the sweep schedule.
    /// Hits bump the entry's hit counter and last-access time.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = self.clock.now();
        let mut data = self.data.write().await;

        match data.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.touch(now);
                self.hits.fetch_add(1, Ordering::SeqCst);
                Some(entry.value.clone())
            }
            Some(_) => {
                // Expired: self-check removes it, counts as a miss.
                data.remove(key);
                self.misses.fetch_add(1, Ordering::SeqCst);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::SeqCst);
                None
            }
        }
    }

    /// Inserts or overwrites a value.
    ///
    /// Falls back to the cache's default TTL when `ttl` is `None`. If the
    /// cache is at capacity and the key is new, one entry is evicted first,
    /// so the size bound holds after every `set`.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
        let now = self.clock.now();
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let expires_at = now
            + chrono::Duration::milliseconds(
                i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
            );

        let mut data = self.data.write().await;
        if !data.contains_key(key) && data.len() >= self.config.max_size {
            evict_one(&mut data, now);
        }
        data.insert(key.to_string(), CacheEntry::new(value, now, expires_at));
    }

    /// Removes a single entry. Idempotent; returns whether the key existed.
    pub async fn delete(&self, key: &str) -> bool {
        self.data.write().await.remove(key).is_some()
    }

    /// Removes every entry whose key contains `pattern`.
    ///
    /// Coarse invalidation for write paths: e.g. clearing all `barang:all`
    /// list variants when any item mutates. Returns the number removed.
    pub async fn clear_pattern(&self, pattern: &str) -> usize {
        let mut data = self.data.write().await;
        let before = data.len();
        data.retain(|key, _| !key.contains(pattern));
        let removed = before - data.len();
        if removed > 0 {
            debug!(cache = %self.name, pattern, removed, "cleared cache entries by pattern");
        }
        removed
    }

    /// Removes all entries and resets the hit/miss counters.
    pub async fn clear(&self) {
        self.data.write().await.clear();
        self.hits.store(0, Ordering::SeqCst);
        self.misses.store(0, Ordering::SeqCst);
    }

    /// Gets a value, or computes and stores it on a miss.
    ///
    /// Concurrent callers that miss the same key serialize on a per-key
    /// lock with a double-check after acquisition, so the producer runs at
    /// most once per populated key.
    pub async fn get_or_set<F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        f: F,
    ) -> CacheResult<Vec<u8>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = CacheResult<Vec<u8>>> + Send,
    {
        // Quick read before taking the key lock.
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let key_lock = self.key_lock(key).await;
        let result = {
            let _guard = key_lock.lock().await;

            // Double-check: another task may have populated it meanwhile.
            // The miss was already counted above, so this read stays off
            // the stats.
            match self.peek(key).await {
                Some(value) => Ok(value),
                None => match f().await {
                    Ok(value) => {
                        self.set(key, value.clone(), ttl).await;
                        Ok(value)
                    }
                    Err(err) => Err(err),
                },
            }
        };

        drop(key_lock);
        self.release_key_lock(key).await;
        result
    }

    /// Uncounted read backing the `get_or_set` double-check. Refreshes
    /// the entry's access bookkeeping but records neither hit nor miss.
    async fn peek(&self, key: &str) -> Option<Vec<u8>> {
        let now = self.clock.now();
        let mut data = self.data.write().await;
        match data.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.touch(now);
                Some(entry.value.clone())
            }
            _ => None,
        }
    }

    /// Removes expired entries; returns how many were removed.
    ///
    /// `get` already self-checks expiry, so this is a memory backstop for
    /// entries that are set and never read again. Called by the background
    /// sweeper.
    pub async fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        let mut data = self.data.write().await;
        let before = data.len();
        data.retain(|_, entry| !entry.is_expired(now));
        before - data.len()
    }

    /// Returns current cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let size = self.data.read().await.len() as u64;
        CacheStats::new(
            self.hits.load(Ordering::SeqCst),
            self.misses.load(Ordering::SeqCst),
            size,
        )
    }

    /// Returns the current number of entries.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    /// Returns true if the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Gets or creates the lock for a specific key.
    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops a key's producer lock once no task holds a clone of it.
    ///
    /// The lock is only needed while a miss is being populated; leaving
    /// it in the map would grow the map by one entry per distinct key
    /// ever produced, unbounded even while the entry map stays capped.
    async fn release_key_lock(&self, key: &str) {
        let mut locks = self.key_locks.lock().await;
        if let Some(lock) = locks.get(key) {
            // A strong count of 1 means only the map itself still holds
            // the Arc; any waiter would hold a clone.
            if Arc::strong_count(lock) == 1 {
                locks.remove(key);
            }
        }
    }
}

impl std::fmt::Debug for TtlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Evicts the entry with the highest eviction score.
///
/// Score is idle time divided by hit count, so recently or frequently read
/// entries survive. Equal scores break on the lexicographically smallest
/// key to keep eviction deterministic.
fn evict_one(data: &mut HashMap<String, CacheEntry>, now: DateTime<Utc>) {
    let victim = data
        .iter()
        .map(|(key, entry)| (key.clone(), entry.eviction_score(now)))
        .reduce(|best, candidate| {
            if candidate.1 > best.1 || (candidate.1 == best.1 && candidate.0 < best.0) {
                candidate
            } else {
                best
            }
        });

    if let Some((key, score)) = victim {
        debug!(key = %key, score, "evicting cache entry at capacity");
        data.remove(&key);
    }
}
