//! Process-wide registry of named caches.
//!
//! One cache instance exists per logical domain (`users`, `barang`,
//! `ruangan`, `peminjaman`, `prodi`, `logs`). The registry hands every
//! caller the same `Arc` for a given name, so an invalidation issued by a
//! write path is observed by every read path. Instances live for the
//! process lifetime; `clear_all` exists for tests.

use super::{CacheConfig, TtlCache};
use crate::clock::{system_clock, SharedClock};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Fallback TTL for domains without a dedicated default.
const FALLBACK_TTL: Duration = Duration::from_secs(300);

/// Per-domain default TTLs.
///
/// Frequently-changing listings (submissions, logs) stay hot for seconds;
/// item and room listings for minutes; detail-by-id rows change least and
/// keep the longest TTL.
const DOMAIN_TTLS: &[(&str, Duration)] = &[
    ("peminjaman", Duration::from_secs(15)),
    ("logs", Duration::from_secs(10)),
    ("barang", Duration::from_secs(180)),
    ("ruangan", Duration::from_secs(180)),
    ("users", Duration::from_secs(300)),
    ("prodi", Duration::from_secs(600)),
];

/// TTL for `*:detail` domains.
const DETAIL_TTL: Duration = Duration::from_secs(600);

/// Registry mapping cache names to shared [`TtlCache`] instances.
pub struct CacheRegistry {
    caches: RwLock<HashMap<String, Arc<TtlCache>>>,
    clock: SharedClock,
}

static GLOBAL: OnceLock<Arc<CacheRegistry>> = OnceLock::new();

impl CacheRegistry {
    /// Creates an empty registry with the given clock.
    pub fn new(clock: SharedClock) -> Self {
        Self {
            caches: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Returns the process-wide registry, creating it on first access.
    pub fn global() -> Arc<CacheRegistry> {
        GLOBAL
            .get_or_init(|| Arc::new(CacheRegistry::new(system_clock())))
            .clone()
    }

    /// Returns the cache for `name`, creating it on first access.
    ///
    /// A supplied config takes precedence over the domain defaults. Later
    /// calls for the same name return the same instance and ignore the
    /// config argument.
    pub async fn get_or_create(
        &self,
        name: &str,
        config: Option<CacheConfig>,
    ) -> Arc<TtlCache> {
        {
            let caches = self.caches.read().await;
            if let Some(cache) = caches.get(name) {
                return cache.clone();
            }
        }

        let mut caches = self.caches.write().await;
        // Double-check after upgrading to a write lock.
        if let Some(cache) = caches.get(name) {
            return cache.clone();
        }

        let config = config.unwrap_or_else(|| Self::default_config(name));
        debug!(cache = name, ttl_secs = config.default_ttl.as_secs(), "creating named cache");
        let cache = Arc::new(TtlCache::new(name, config, self.clock.clone()));
        caches.insert(name.to_string(), cache.clone());
        cache
    }

    /// Domain default config for a cache name.
    fn default_config(name: &str) -> CacheConfig {
        if name.ends_with(":detail") {
            return CacheConfig::with_ttl(DETAIL_TTL);
        }
        let ttl = DOMAIN_TTLS
            .iter()
            .find(|(domain, _)| name == *domain || name.starts_with(&format!("{domain}:")))
            .map(|(_, ttl)| *ttl)
            .unwrap_or(FALLBACK_TTL);
        CacheConfig::with_ttl(ttl)
    }

    /// Snapshot of all registered caches (used by the sweeper).
    pub async fn snapshot(&self) -> Vec<Arc<TtlCache>> {
        self.caches.read().await.values().cloned().collect()
    }

    /// Clears every registered cache. Intended for tests.
    pub async fn clear_all(&self) {
        for cache in self.snapshot().await {
            cache.clear().await;
        }
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_name_returns_same_instance() {
        let registry = CacheRegistry::new(system_clock());

        let a = registry.get_or_create("barang", None).await;
        a.set("barang:all", b"x".to_vec(), None).await;

        // A second handle observes writes through the first.
        let b = registry.get_or_create("barang", None).await;
        assert_eq!(b.get("barang:all").await, Some(b"x".to_vec()));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_domain_default_ttls() {
        assert_eq!(
            CacheRegistry::default_config("peminjaman").default_ttl,
            Duration::from_secs(15)
        );
        assert_eq!(
            CacheRegistry::default_config("logs").default_ttl,
            Duration::from_secs(10)
        );
        assert_eq!(
            CacheRegistry::default_config("barang").default_ttl,
            Duration::from_secs(180)
        );
        assert_eq!(
            CacheRegistry::default_config("barang:detail").default_ttl,
            Duration::from_secs(600)
        );
        assert_eq!(
            CacheRegistry::default_config("something-else").default_ttl,
            FALLBACK_TTL
        );
    }

    #[tokio::test]
    async fn test_supplied_config_wins_on_first_creation() {
        let registry = CacheRegistry::new(system_clock());
        let cache = registry
            .get_or_create(
                "barang",
                Some(CacheConfig {
                    default_ttl: Duration::from_secs(7),
                    max_size: 3,
                }),
            )
            .await;
        assert_eq!(cache.config().default_ttl, Duration::from_secs(7));
        assert_eq!(cache.config().max_size, 3);
    }

    #[tokio::test]
    async fn test_clear_all() {
        let registry = CacheRegistry::new(system_clock());
        let barang = registry.get_or_create("barang", None).await;
        let ruangan = registry.get_or_create("ruangan", None).await;
        barang.set("a", b"1".to_vec(), None).await;
        ruangan.set("b", b"2".to_vec(), None).await;

        registry.clear_all().await;

        assert!(barang.is_empty().await);
        assert!(ruangan.is_empty().await);
    }
}
