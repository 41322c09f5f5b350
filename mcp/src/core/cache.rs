//! Bounded, time-expiring metadata cache.

use std::{
    hash::Hash,
    num::NonZeroUsize,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use crate::model::FullTableName;

/// Key of a cached remote call: the call's parameter tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Catalogs,
    Schemas(String),
    Tables(String, String),
    Table(FullTableName),
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Thread-safe LRU cache whose entries expire after a fixed TTL.
///
/// Expiry uses `tokio::time::Instant`, so tests can drive it with paused time.
pub struct TtlCache<K: Hash + Eq, V: Clone> {
    entries: Mutex<LruCache<K, CacheEntry<V>>>,
    ttl: Duration,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            capacity: capacity.get(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Get a live entry, promoting it in LRU order. Expired entries are dropped.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert or replace an entry, evicting the least recently used one when full.
    pub fn insert(&self, key: K, value: V) {
        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
        };
        let mut entries = self.entries.lock();
        if let Some((evicted_key, _)) = entries.push(key, entry) {
            // push returns the old entry on replacement too
            if !entries.contains(&evicted_key) {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn invalidate(&self, key: &K) -> bool {
        self.entries.lock().pop(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            len: self.len(),
            capacity: self.capacity,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub len: usize,
    pub capacity: usize,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn cache(capacity: usize, ttl_secs: u64) -> TtlCache<String, u32> {
        TtlCache::new(
            NonZeroUsize::new(capacity).unwrap(),
            Duration::from_secs(ttl_secs),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_within_ttl() {
        let cache = cache(4, 60);
        assert_eq!(cache.get(&"a".to_string()), None);

        cache.insert("a".to_string(), 1);
        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = cache(4, 60);
        cache.insert("a".to_string(), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get(&"a".to_string()), None);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reinsert_refreshes_timestamp() {
        let cache = cache(4, 60);
        cache.insert("a".to_string(), 1);
        tokio::time::advance(Duration::from_secs(40)).await;
        cache.insert("a".to_string(), 2);
        tokio::time::advance(Duration::from_secs(40)).await;

        assert_eq!(cache.get(&"a".to_string()), Some(2));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_lru_eviction_on_capacity() {
        let cache = cache(2, 60);
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);

        // Touch "a" so "b" becomes least recently used
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        cache.insert("c".to_string(), 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"b".to_string()), None);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"c".to_string()), Some(3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache = cache(4, 60);
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);

        assert!(cache.invalidate(&"a".to_string()));
        assert!(!cache.invalidate(&"a".to_string()));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().capacity, 4);
    }

    #[test]
    fn test_cache_key_equality() {
        let a = CacheKey::Tables("sales".into(), "public".into());
        let b = CacheKey::Tables("sales".into(), "public".into());
        let c = CacheKey::Tables("sales".into(), "private".into());
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(CacheKey::Schemas("sales".into()), CacheKey::Catalogs);
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let cache = Arc::new(cache(64, 60));
        let mut handles = Vec::new();
        for i in 0..8u32 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                for j in 0..100u32 {
                    let key = format!("k{}", (i * 100 + j) % 32);
                    cache.insert(key.clone(), j);
                    let _ = cache.get(&key);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(cache.len() <= 32);
    }
}
