//! Background expiry sweep.
//!
//! `get` already self-checks expiry, so the sweep is a memory backstop:
//! entries that are set and never read again would otherwise live until
//! eviction pressure. The sweep is a detached task; it never reports
//! failures to a caller.

use super::registry::CacheRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Default sweep interval: 5 minutes.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Spawns a detached task that periodically removes expired entries from
/// every cache in the registry.
///
/// The handle may be used to abort the sweep during shutdown; dropping it
/// leaves the task running for the process lifetime.
pub fn spawn_sweeper(registry: Arc<CacheRegistry>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; skip it so the sweep runs
        // one full interval after startup.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let mut removed = 0usize;
            for cache in registry.snapshot().await {
                removed += cache.cleanup_expired().await;
            }
            debug!(removed, "cache sweep completed");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::clock::ManualClock;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_expired_entries() {
        let clock = Arc::new(ManualClock::at_system_time());
        let registry = Arc::new(CacheRegistry::new(clock.clone()));
        let cache = registry
            .get_or_create(
                "barang",
                Some(CacheConfig::with_ttl(Duration::from_secs(30))),
            )
            .await;

        cache.set("stale", b"v".to_vec(), None).await;
        clock.advance(chrono::Duration::seconds(60));

        let handle = spawn_sweeper(registry.clone(), Duration::from_secs(10));

        // Let the first sweep interval elapse under the paused runtime.
        tokio::time::sleep(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;

        assert_eq!(cache.len().await, 0);
        handle.abort();
    }
}
