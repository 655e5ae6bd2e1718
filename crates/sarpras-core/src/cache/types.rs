//! Cache entry and statistics types.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Configuration for a single named cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL applied when `set` is called without an explicit TTL.
    pub default_ttl: Duration,
    /// Maximum number of entries; eviction runs before inserts at capacity.
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            max_size: 1000,
        }
    }
}

impl CacheConfig {
    /// Creates a config with the given default TTL and the default capacity.
    pub fn with_ttl(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            ..Self::default()
        }
    }
}

/// A single cache entry with value, expiry, and access bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached value as bytes (canonical JSON in practice).
    pub value: Vec<u8>,
    /// When this entry expires.
    pub expires_at: DateTime<Utc>,
    /// Number of hits this entry has served.
    pub hit_count: u64,
    /// When this entry was created.
    pub created_at: DateTime<Utc>,
    /// When this entry was last read.
    pub last_accessed_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Creates a new entry at `now` expiring at `expires_at`.
    pub fn new(value: Vec<u8>, now: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value,
            expires_at,
            hit_count: 0,
            created_at: now,
            last_accessed_at: now,
        }
    }

    /// Returns true if this entry has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Records a hit at `now`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.hit_count += 1;
        self.last_accessed_at = now;
    }

    /// Eviction score: idle time weighted down by popularity.
    ///
    /// `idle_seconds / max(hit_count, 1)` — a frequently read entry keeps a
    /// low score even when it has not been touched recently. The entry with
    /// the highest score is evicted first; ties break on the smallest key.
    pub fn eviction_score(&self, now: DateTime<Utc>) -> f64 {
        let idle = (now - self.last_accessed_at).num_milliseconds().max(0) as f64 / 1000.0;
        idle / (self.hit_count.max(1) as f64)
    }
}

/// Statistics for cache operations.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Current number of entries in the cache.
    pub size: u64,
    /// Cache hit rate (hits / (hits + misses)), 0.0 if no operations.
    pub hit_rate: f64,
}

impl CacheStats {
    /// Creates a new CacheStats instance with the given values.
    pub fn new(hits: u64, misses: u64, size: u64) -> Self {
        let hit_rate = if hits + misses > 0 {
            hits as f64 / (hits + misses) as f64
        } else {
            0.0
        };

        Self {
            hits,
            misses,
            size,
            hit_rate,
        }
    }

    /// Returns the total number of cache operations (hits + misses).
    pub fn total_operations(&self) -> u64 {
        self.hits + self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_entry_expiry() {
        let now = Utc::now();
        let entry = CacheEntry::new(vec![1], now, now + ChronoDuration::seconds(30));
        assert!(!entry.is_expired(now));
        assert!(entry.is_expired(now + ChronoDuration::seconds(30)));
        assert!(entry.is_expired(now + ChronoDuration::seconds(31)));
    }

    #[test]
    fn test_touch_updates_bookkeeping() {
        let now = Utc::now();
        let mut entry = CacheEntry::new(vec![1], now, now + ChronoDuration::minutes(5));
        let later = now + ChronoDuration::seconds(10);
        entry.touch(later);
        entry.touch(later);
        assert_eq!(entry.hit_count, 2);
        assert_eq!(entry.last_accessed_at, later);
    }

    #[test]
    fn test_eviction_score_favors_popular_entries() {
        let now = Utc::now();
        let later = now + ChronoDuration::seconds(100);

        let cold = CacheEntry::new(vec![1], now, later + ChronoDuration::minutes(5));
        let mut hot = CacheEntry::new(vec![2], now, later + ChronoDuration::minutes(5));
        for _ in 0..10 {
            hot.touch(now);
        }

        // Same idle time, but the popular entry scores lower.
        assert!(hot.eviction_score(later) < cold.eviction_score(later));
    }

    #[test]
    fn test_stats_hit_rate() {
        let stats = CacheStats::new(80, 20, 100);
        assert!((stats.hit_rate - 0.8).abs() < f64::EPSILON);
        assert_eq!(stats.total_operations(), 100);

        let empty = CacheStats::new(0, 0, 0);
        assert_eq!(empty.hit_rate, 0.0);
    }
}
