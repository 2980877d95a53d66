// Expiring in-process cache used in front of the vehicle store.
// One map behind one mutex; entries expire after a fixed TTL and there is no
// invalidation on writes.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

// Counters kept by the cache
#[derive(Debug, Default)]
pub struct CacheStats {
    pub items_count: AtomicUsize,
    pub hit_count: AtomicUsize,
    pub miss_count: AtomicUsize,
    pub eviction_count: AtomicUsize,
    pub expired_count: AtomicUsize,
}

// Point-in-time copy of the counters
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStatsReport {
    pub items_count: usize,
    pub hit_count: usize,
    pub miss_count: usize,
    pub eviction_count: usize,
    pub expired_count: usize,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub default_ttl_seconds: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 60,
            max_entries: 1024,
        }
    }
}

pub trait ExpiringCache<V>: Send + Sync {
    // Value for the key if present and not expired
    fn get(&self, key: &str) -> Option<V>;

    // Store a value; `None` uses the configured default TTL
    fn set(&self, key: &str, value: V, ttl: Option<Duration>);

    // Drop every expired entry, returning how many were removed
    fn purge_expired(&self) -> usize;

    fn clear(&self);

    fn stats(&self) -> CacheStatsReport;
}

// Key for a page of vehicle makes
pub fn create_cache_key(make_name: Option<&str>, limit: i64, offset: i64) -> String {
    format!("vehicles_{}_{}_{}", make_name.unwrap_or("all"), limit, offset)
}

struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }
}

pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    config: CacheConfig,
    stats: CacheStats,
}

impl<V: Clone + Send + 'static> TtlCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
            stats: CacheStats::default(),
        }
    }

    fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.config.default_ttl_seconds)
    }

    // Called with the lock held and the map at capacity
    fn evict_oldest(&self, entries: &mut HashMap<String, CacheEntry<V>>) {
        let oldest_key = entries
            .iter()
            .min_by_key(|(_, entry)| entry.created_at)
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest_key {
            entries.remove(&key);
            self.stats.eviction_count.fetch_add(1, Ordering::SeqCst);
            self.stats.items_count.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!(key = %key, "evicted oldest cache entry");
        }
    }
}

impl<V: Clone + Send + 'static> ExpiringCache<V> for TtlCache<V> {
    fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                self.stats.items_count.fetch_sub(1, Ordering::SeqCst);
                self.stats.expired_count.fetch_add(1, Ordering::SeqCst);
                self.stats.miss_count.fetch_add(1, Ordering::SeqCst);
                None
            }
            Some(entry) => {
                self.stats.hit_count.fetch_add(1, Ordering::SeqCst);
                Some(entry.value.clone())
            }
            None => {
                self.stats.miss_count.fetch_add(1, Ordering::SeqCst);
                None
            }
        }
    }

    fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        if self.config.max_entries == 0 {
            return;
        }

        let entry = CacheEntry {
            value,
            created_at: Instant::now(),
            ttl: ttl.unwrap_or_else(|| self.default_ttl()),
        };

        let mut entries = self.entries.lock();
        if !entries.contains_key(key) {
            while entries.len() >= self.config.max_entries {
                self.evict_oldest(&mut entries);
            }
            self.stats.items_count.fetch_add(1, Ordering::SeqCst);
        }
        entries.insert(key.to_string(), entry);
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();

        self.stats.items_count.fetch_sub(removed, Ordering::SeqCst);
        self.stats.expired_count.fetch_add(removed, Ordering::SeqCst);
        removed
    }

    fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.clear();
        self.stats.items_count.store(0, Ordering::SeqCst);
    }

    fn stats(&self) -> CacheStatsReport {
        CacheStatsReport {
            items_count: self.stats.items_count.load(Ordering::SeqCst),
            hit_count: self.stats.hit_count.load(Ordering::SeqCst),
            miss_count: self.stats.miss_count.load(Ordering::SeqCst),
            eviction_count: self.stats.eviction_count.load(Ordering::SeqCst),
            expired_count: self.stats.expired_count.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn small_config(max_entries: usize) -> CacheConfig {
        CacheConfig {
            default_ttl_seconds: 300,
            max_entries,
        }
    }

    #[test]
    fn test_cache_key_format() {
        assert_eq!(create_cache_key(None, 10, 0), "vehicles_all_10_0");
        assert_eq!(create_cache_key(Some("Toyota"), 5, 20), "vehicles_Toyota_5_20");
    }

    #[test]
    fn test_get_and_set() {
        let cache: TtlCache<Vec<u32>> = TtlCache::new(CacheConfig::default());

        assert!(cache.get("vehicles_all_10_0").is_none());
        cache.set("vehicles_all_10_0", vec![1, 2, 3], None);
        assert_eq!(cache.get("vehicles_all_10_0"), Some(vec![1, 2, 3]));

        let stats = cache.stats();
        assert_eq!(stats.items_count, 1);
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
    }

    #[test]
    fn test_expiration_and_ttl() {
        let cache: TtlCache<&'static str> = TtlCache::new(small_config(16));

        cache.set("long", "kept", None);
        cache.set("short", "dropped", Some(Duration::from_millis(50)));
        assert_eq!(cache.get("short"), Some("dropped"));

        thread::sleep(Duration::from_millis(120));

        assert_eq!(cache.get("long"), Some("kept"));
        assert!(cache.get("short").is_none());

        let stats = cache.stats();
        assert_eq!(stats.expired_count, 1);
        assert_eq!(stats.items_count, 1);
    }

    #[test]
    fn test_zero_ttl_is_never_served() {
        let cache: TtlCache<u8> = TtlCache::new(small_config(4));
        cache.set("k", 1, Some(Duration::ZERO));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_purge_expired() {
        let cache: TtlCache<u8> = TtlCache::new(small_config(16));
        for i in 0..5 {
            cache.set(&format!("short{}", i), i, Some(Duration::from_millis(10)));
        }
        cache.set("long", 42, None);

        thread::sleep(Duration::from_millis(50));

        assert_eq!(cache.purge_expired(), 5);
        assert_eq!(cache.stats().items_count, 1);
        assert_eq!(cache.get("long"), Some(42));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache: TtlCache<u8> = TtlCache::new(small_config(2));

        cache.set("first", 1, None);
        thread::sleep(Duration::from_millis(2));
        cache.set("second", 2, None);
        thread::sleep(Duration::from_millis(2));
        cache.set("third", 3, None);

        assert!(cache.get("first").is_none());
        assert_eq!(cache.get("second"), Some(2));
        assert_eq!(cache.get("third"), Some(3));
        assert_eq!(cache.stats().eviction_count, 1);
        assert_eq!(cache.stats().items_count, 2);
    }

    #[test]
    fn test_overwrite_does_not_grow() {
        let cache: TtlCache<u8> = TtlCache::new(small_config(2));
        cache.set("a", 1, None);
        cache.set("a", 2, None);

        assert_eq!(cache.get("a"), Some(2));
        assert_eq!(cache.stats().items_count, 1);
        assert_eq!(cache.stats().eviction_count, 0);
    }

    #[test]
    fn test_clear() {
        let cache: TtlCache<u8> = TtlCache::new(small_config(8));
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.clear();

        assert!(cache.get("a").is_none());
        assert_eq!(cache.stats().items_count, 0);
    }

    #[test]
    fn test_concurrent_access_with_contention() {
        let cache: Arc<TtlCache<Vec<u8>>> = Arc::new(TtlCache::new(small_config(64)));
        let threads_count = 8;
        let operations_per_thread = 500;

        let mut handles = vec![];
        for i in 0..threads_count {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for j in 0..operations_per_thread {
                    let key = create_cache_key(Some("make"), (j % 10) as i64, (i % 3) as i64);
                    if j % 5 == 0 {
                        cache.set(&key, vec![i as u8, j as u8], None);
                    } else {
                        let _ = cache.get(&key);
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = cache.stats();
        assert!(stats.items_count <= 64);
        assert_eq!(
            stats.hit_count + stats.miss_count,
            threads_count * operations_per_thread * 4 / 5
        );
    }
}
