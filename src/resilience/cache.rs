//! # Result Cache
//!
//! Per-dependency memoization of successful results, keyed by [`CallKey`].
//! Each dependency owns an independent Moka cache with its own TTL and entry
//! bound; once the bound is exceeded the least recently used entry is evicted.
//!
//! Values are stored type-erased so one cache can serve heterogeneous
//! dependencies. A lookup whose stored type does not match the requested type
//! counts as a miss.
//!
//! Only successful values are ever put here; failures and timeouts never reach
//! the cache.

use super::outcome::{CallKey, DependencyName};
use crate::config::CacheSettings;
use crate::constants::defaults;
use dashmap::DashMap;
use moka::policy::EvictionPolicy;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

type CachedValue = Arc<dyn Any + Send + Sync>;

// Moka refuses TTLs beyond 1000 years; per-call overrides skip validation
const TTL_CEILING: Duration = Duration::from_millis(defaults::CACHE_TTL_CEILING_MS);

/// Hit/miss counters and current size for one dependency
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
}

struct DependencyCache {
    entries: moka::future::Cache<CallKey, CachedValue>,
    settings: CacheSettings,
    counters: Arc<Counters>,
}

impl DependencyCache {
    fn build(settings: &CacheSettings, counters: Arc<Counters>) -> Self {
        let entries = moka::future::Cache::builder()
            .max_capacity(settings.max_entries)
            .time_to_live(settings.ttl().min(TTL_CEILING))
            .eviction_policy(EvictionPolicy::lru())
            .build();

        Self {
            entries,
            settings: settings.clone(),
            counters,
        }
    }
}

impl std::fmt::Debug for DependencyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyCache")
            .field("max_capacity", &self.entries.policy().max_capacity())
            .field("entry_count", &self.entries.entry_count())
            .field("ttl_ms", &self.settings.ttl_ms)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct ResultCache {
    caches: DashMap<DependencyName, Arc<DependencyCache>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure the dependency's cache matches `settings`.
    ///
    /// Changing TTL or capacity at runtime rebuilds the dependency's cache and
    /// drops its entries; hit/miss counters carry over.
    pub fn configure(&self, dependency: &DependencyName, settings: &CacheSettings) {
        if let Some(existing) = self.caches.get(dependency) {
            if existing.settings == *settings {
                return;
            }
        }

        self.caches
            .entry(dependency.clone())
            .and_modify(|existing| {
                if existing.settings != *settings {
                    debug!(
                        dependency = %dependency,
                        ttl_ms = settings.ttl_ms,
                        max_entries = settings.max_entries,
                        "Rebuilding result cache after settings change"
                    );
                    *existing = Arc::new(DependencyCache::build(
                        settings,
                        Arc::clone(&existing.counters),
                    ));
                }
            })
            .or_insert_with(|| {
                debug!(
                    dependency = %dependency,
                    ttl_ms = settings.ttl_ms,
                    max_entries = settings.max_entries,
                    "Result cache created"
                );
                Arc::new(DependencyCache::build(settings, Arc::default()))
            });
    }

    fn cache_for(&self, dependency: &DependencyName) -> Arc<DependencyCache> {
        if let Some(existing) = self.caches.get(dependency) {
            return Arc::clone(&existing);
        }
        self.configure(dependency, &CacheSettings::default());
        self.caches
            .get(dependency)
            .map(|cache| Arc::clone(&cache))
            .unwrap_or_else(|| {
                Arc::new(DependencyCache::build(
                    &CacheSettings::default(),
                    Arc::default(),
                ))
            })
    }

    /// Look up a cached value, counting the hit or miss
    pub async fn get<V>(&self, dependency: &DependencyName, key: &CallKey) -> Option<V>
    where
        V: Clone + Send + Sync + 'static,
    {
        let cache = self.cache_for(dependency);

        let value = match cache.entries.get(key).await {
            Some(stored) => match stored.downcast_ref::<V>() {
                Some(value) => Some(value.clone()),
                None => {
                    warn!(
                        dependency = %dependency,
                        key = %key,
                        expected = std::any::type_name::<V>(),
                        "Cached value has unexpected type - treating as miss"
                    );
                    None
                }
            },
            None => None,
        };

        if value.is_some() {
            cache.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!(dependency = %dependency, key = %key, "Cache HIT");
        } else {
            cache.counters.misses.fetch_add(1, Ordering::Relaxed);
            debug!(dependency = %dependency, key = %key, "Cache MISS");
        }
        value
    }

    /// Store a successful value, replacing any previous entry for the key
    pub async fn put<V>(&self, dependency: &DependencyName, key: CallKey, value: V)
    where
        V: Send + Sync + 'static,
    {
        let cache = self.cache_for(dependency);
        debug!(dependency = %dependency, key = %key, "Cache SET");
        cache.entries.insert(key, Arc::new(value)).await;
    }

    pub async fn invalidate(&self, dependency: &DependencyName, key: &CallKey) {
        if let Some(cache) = self.caches.get(dependency).map(|c| Arc::clone(&c)) {
            cache.entries.invalidate(key).await;
        }
    }

    pub fn invalidate_dependency(&self, dependency: &DependencyName) {
        if let Some(cache) = self.caches.get(dependency) {
            cache.entries.invalidate_all();
        }
    }

    pub fn stats(&self, dependency: &DependencyName) -> CacheStats {
        self.caches
            .get(dependency)
            .map(|cache| CacheStats {
                hits: cache.counters.hits.load(Ordering::Relaxed),
                misses: cache.counters.misses.load(Ordering::Relaxed),
                entries: cache.entries.entry_count(),
            })
            .unwrap_or_default()
    }

    /// Flush pending eviction and expiry work so `stats` reflects it
    pub async fn run_pending_tasks(&self, dependency: &DependencyName) {
        if let Some(cache) = self.caches.get(dependency).map(|c| Arc::clone(&c)) {
            cache.entries.run_pending_tasks().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn settings(ttl: Duration, max_entries: u64) -> CacheSettings {
        CacheSettings {
            enabled: true,
            ttl_ms: ttl.as_millis() as u64,
            max_entries,
        }
    }

    #[tokio::test]
    async fn test_get_returns_none_on_miss() {
        let cache = ResultCache::new();
        let dep: DependencyName = "pricing-scraper".into();

        assert_eq!(cache.get::<String>(&dep, &"123".into()).await, None);
        assert_eq!(cache.stats(&dep).misses, 1);
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = ResultCache::new();
        let dep: DependencyName = "pricing-scraper".into();
        cache.configure(&dep, &settings(Duration::from_secs(60), 10));

        cache.put(&dep, "123".into(), 1550_u64).await;

        assert_eq!(cache.get::<u64>(&dep, &"123".into()).await, Some(1550));
        let stats = cache.stats(&dep);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[tokio::test]
    async fn test_dependencies_are_isolated() {
        let cache = ResultCache::new();
        let pricing: DependencyName = "pricing-scraper".into();
        let users: DependencyName = "user-directory".into();

        cache.put(&pricing, "1".into(), "price".to_string()).await;

        assert_eq!(cache.get::<String>(&users, &"1".into()).await, None);
        assert_eq!(
            cache.get::<String>(&pricing, &"1".into()).await.as_deref(),
            Some("price")
        );
    }

    #[tokio::test]
    async fn test_type_mismatch_is_a_miss() {
        let cache = ResultCache::new();
        let dep: DependencyName = "pricing-scraper".into();
        cache.put(&dep, "1".into(), 42_u32).await;

        assert_eq!(cache.get::<String>(&dep, &"1".into()).await, None);
        assert_eq!(cache.stats(&dep).misses, 1);
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let cache = ResultCache::new();
        let dep: DependencyName = "pricing-scraper".into();
        cache.configure(&dep, &settings(Duration::from_millis(50), 10));

        cache.put(&dep, "1".into(), 7_i32).await;
        assert_eq!(cache.get::<i32>(&dep, &"1".into()).await, Some(7));

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(cache.get::<i32>(&dep, &"1".into()).await, None);
    }

    #[tokio::test]
    async fn test_capacity_bound_is_enforced() {
        let cache = ResultCache::new();
        let dep: DependencyName = "pricing-scraper".into();
        cache.configure(&dep, &settings(Duration::from_secs(60), 2));

        for id in 0..5_i64 {
            cache.put(&dep, id.into(), id).await;
        }
        cache.run_pending_tasks(&dep).await;

        assert!(cache.stats(&dep).entries <= 2);
    }

    #[tokio::test]
    async fn test_least_recently_used_entry_is_evicted() {
        let cache = ResultCache::new();
        let dep: DependencyName = "pricing-scraper".into();
        cache.configure(&dep, &settings(Duration::from_secs(60), 2));

        cache.put(&dep, "a".into(), 1_i32).await;
        cache.put(&dep, "b".into(), 2_i32).await;
        cache.run_pending_tasks(&dep).await;
        assert_eq!(cache.get::<i32>(&dep, &"a".into()).await, Some(1));
        cache.run_pending_tasks(&dep).await;

        cache.put(&dep, "c".into(), 3_i32).await;
        cache.run_pending_tasks(&dep).await;

        assert_eq!(cache.get::<i32>(&dep, &"a".into()).await, Some(1));
        assert_eq!(cache.get::<i32>(&dep, &"b".into()).await, None);
        assert_eq!(cache.get::<i32>(&dep, &"c".into()).await, Some(3));
    }

    #[tokio::test]
    async fn test_oversized_ttl_is_clamped() {
        let cache = ResultCache::new();
        let dep: DependencyName = "pricing-scraper".into();
        let mut oversized = settings(Duration::from_secs(60), 10);
        oversized.ttl_ms = u64::MAX;
        cache.configure(&dep, &oversized);

        cache.put(&dep, "1".into(), 1_i32).await;
        assert_eq!(cache.get::<i32>(&dep, &"1".into()).await, Some(1));
    }

    #[tokio::test]
    async fn test_put_replaces_existing_entry() {
        let cache = ResultCache::new();
        let dep: DependencyName = "pricing-scraper".into();

        cache.put(&dep, "1".into(), 1_i32).await;
        cache.put(&dep, "1".into(), 2_i32).await;

        assert_eq!(cache.get::<i32>(&dep, &"1".into()).await, Some(2));
    }

    #[tokio::test]
    async fn test_reconfigure_keeps_counters_and_drops_entries() {
        let cache = ResultCache::new();
        let dep: DependencyName = "pricing-scraper".into();
        cache.configure(&dep, &settings(Duration::from_secs(60), 10));
        cache.put(&dep, "1".into(), 1_i32).await;
        let _ = cache.get::<i32>(&dep, &"1".into()).await;

        cache.configure(&dep, &settings(Duration::from_secs(30), 10));

        assert_eq!(cache.get::<i32>(&dep, &"1".into()).await, None);
        let stats = cache.stats(&dep);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache = ResultCache::new();
        let dep: DependencyName = "pricing-scraper".into();
        cache.put(&dep, "1".into(), 1_i32).await;

        cache.invalidate(&dep, &"1".into()).await;
        assert_eq!(cache.get::<i32>(&dep, &"1".into()).await, None);
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            entries: 3,
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
