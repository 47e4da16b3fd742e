//! Generic TTL cache.
//!
//! A `RwLock<HashMap>` of whole-value entries. Writers always replace the
//! full value for a key, so a concurrent reader observes either the old
//! list or the new one, never a partially merged state. Expiry is lazy on
//! `get`, with a periodic sweep gated by `should_cleanup`.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::stats::{CacheInfo, KeyInfo};

const TOP_KEYS: usize = 5;

struct CacheEntry<V> {
    value: V,
    cached_at: Instant,
}

#[derive(Default)]
struct KeyCounters {
    hits: u64,
    misses: u64,
}

struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    counters: HashMap<String, KeyCounters>,
    hits: u64,
    misses: u64,
    last_cleanup: Instant,
}

pub struct TtlCache<V> {
    inner: RwLock<Inner<V>>,
    ttl: Duration,
    cleanup_min_interval: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration, cleanup_min_interval: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                counters: HashMap::new(),
                hits: 0,
                misses: 0,
                last_cleanup: Instant::now(),
            }),
            ttl,
            cleanup_min_interval,
        }
    }

    /// Clone of the live value, or `None` (counted as a miss) when absent
    /// or expired. An expired entry is evicted on the spot.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let expired = match inner.entries.get(key) {
            Some(entry) => entry.cached_at.elapsed() > self.ttl,
            None => false,
        };
        if expired {
            inner.entries.remove(key);
        }
        match inner.entries.get(key) {
            Some(entry) => {
                let value = entry.value.clone();
                inner.hits += 1;
                inner.counters.entry(key.to_string()).or_default().hits += 1;
                Some(value)
            }
            None => {
                inner.misses += 1;
                inner.counters.entry(key.to_string()).or_default().misses += 1;
                None
            }
        }
    }

    /// Insert or replace the whole value for a key.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner
            .entries
            .insert(key.into(), CacheEntry { value, cached_at: Instant::now() });
    }

    /// Read-modify-replace under one lock. `f` receives the live
    /// (unexpired) value if any and returns the replacement.
    pub fn replace_with(&self, key: &str, f: impl FnOnce(Option<&V>) -> V) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let current = inner
            .entries
            .get(key)
            .filter(|e| e.cached_at.elapsed() <= self.ttl)
            .map(|e| &e.value);
        let next = f(current);
        inner
            .entries
            .insert(key.to_string(), CacheEntry { value: next, cached_at: Instant::now() });
    }

    pub fn invalidate(&self, key: &str) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.entries.remove(key);
    }

    pub fn invalidate_all(&self) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let n = inner.entries.len();
        inner.entries.clear();
        debug!(entries = n, "cache invalidated");
    }

    /// Evict every expired entry. Returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let before = inner.entries.len();
        let ttl = self.ttl;
        inner.entries.retain(|_, e| e.cached_at.elapsed() <= ttl);
        inner.last_cleanup = Instant::now();
        before - inner.entries.len()
    }

    /// Gate for the periodic sweep: true once the minimum interval since
    /// the last sweep has passed.
    pub fn should_cleanup(&self) -> bool {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.last_cleanup.elapsed() >= self.cleanup_min_interval
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn info(&self) -> CacheInfo {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<KeyInfo> = inner
            .counters
            .iter()
            .map(|(key, c)| KeyInfo {
                key: key.clone(),
                hits: c.hits,
                misses: c.misses,
                age_secs: inner.entries.get(key).map(|e| e.cached_at.elapsed().as_secs()),
            })
            .collect();
        keys.sort_by(|a, b| (b.hits + b.misses).cmp(&(a.hits + a.misses)));
        let top_keys = keys.iter().take(TOP_KEYS).map(|k| k.key.clone()).collect();
        let total = inner.hits + inner.misses;
        CacheInfo {
            size: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
            hit_rate: if total == 0 { 0.0 } else { inner.hits as f64 / total as f64 },
            keys,
            top_keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(ttl_ms: u64) -> TtlCache<Vec<u32>> {
        TtlCache::new(Duration::from_millis(ttl_ms), Duration::from_millis(0))
    }

    #[test]
    fn get_returns_none_after_ttl() {
        let c = cache(10);
        c.set("k", vec![1]);
        assert_eq!(c.get("k"), Some(vec![1]));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(c.get("k"), None);
        // The expired entry was evicted, not just hidden.
        assert_eq!(c.len(), 0);
    }

    #[test]
    fn hit_rate_counts_hits_and_misses() {
        let c = cache(10_000);
        c.set("a", vec![1]);
        assert!(c.get("a").is_some());
        assert!(c.get("b").is_none());
        let info = c.info();
        assert_eq!(info.hits, 1);
        assert_eq!(info.misses, 1);
        assert!((info.hit_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn cleanup_expired_reports_removals() {
        let c = cache(10);
        c.set("a", vec![1]);
        c.set("b", vec![2]);
        std::thread::sleep(Duration::from_millis(20));
        c.set("c", vec![3]);
        assert_eq!(c.cleanup_expired(), 2);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn should_cleanup_gates_on_interval() {
        let c = TtlCache::<Vec<u32>>::new(Duration::from_secs(60), Duration::from_secs(3600));
        assert!(!c.should_cleanup());
        let eager = TtlCache::<Vec<u32>>::new(Duration::from_secs(60), Duration::from_millis(0));
        assert!(eager.should_cleanup());
    }

    #[test]
    fn invalidate_all_empties_the_cache() {
        let c = cache(10_000);
        c.set("a", vec![1]);
        c.set("b", vec![2]);
        c.invalidate_all();
        assert!(c.is_empty());
    }

    #[test]
    fn replace_with_sees_current_value() {
        let c = cache(10_000);
        c.set("k", vec![1]);
        c.replace_with("k", |cur| {
            let mut v = cur.cloned().unwrap_or_default();
            v.insert(0, 9);
            v
        });
        assert_eq!(c.get("k"), Some(vec![9, 1]));
    }
}
