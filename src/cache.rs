//! Bounded memoization for remote lookups.
//!
//! Each lookup kind gets its own `BoundedCache`, keyed by the deterministic
//! inputs of the lookup. Eviction is least-recently-used. Entries live for
//! the lifetime of the process and are never invalidated mid-run; failed
//! lookups are not memoized, so a later call re-attempts the remote fetch.

use anyhow::Result;
use lru::LruCache;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::TARGET_CACHE;

pub struct BoundedCache<K, V> {
    name: &'static str,
    entries: Mutex<LruCache<K, V>>,
    // One gate per key with a fetch in flight, so concurrent callers of the
    // same key trigger at most one remote computation.
    in_flight: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<K, V> BoundedCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        BoundedCache {
            name,
            entries: Mutex::new(LruCache::new(capacity)),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached value for `key`, promoting its recency.
    pub fn get(&self, key: &K) -> Option<V> {
        lock(&self.entries).get(key).cloned()
    }

    /// Inserts a value, evicting the least-recently-used entry when full.
    pub fn put(&self, key: K, value: V) {
        lock(&self.entries).put(key, value);
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the cached value for `key`, or runs `fetch` and memoizes its
    /// result. A `fetch` that fails is not memoized. At most one fetch per
    /// key is in flight at a time; concurrent callers wait and then re-read
    /// the cache.
    pub async fn get_or_try_fetch<F, Fut>(&self, key: K, fetch: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let _guard = loop {
            if let Some(value) = self.get(&key) {
                debug!(target: TARGET_CACHE, "{} cache hit", self.name);
                return Ok(value);
            }
            let gate = lock(&self.in_flight)
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone();
            match gate.clone().try_lock_owned() {
                Ok(guard) => break guard,
                Err(_) => {
                    // Another caller owns the fetch; wait for it to settle,
                    // then re-check the cache.
                    let _wait = gate.lock_owned().await;
                }
            }
        };

        debug!(target: TARGET_CACHE, "{} cache miss", self.name);
        let result = fetch().await;
        if let Ok(value) = &result {
            self.put(key.clone(), value.clone());
        }
        lock(&self.in_flight).remove(&key);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_repeated_lookups_fetch_once() {
        let cache: BoundedCache<String, usize> = BoundedCache::new("test", 8);
        let calls = AtomicUsize::new(0);

        for _ in 0..5 {
            let value = cache
                .get_or_try_fetch("k".to_string(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await
                .unwrap();
            assert_eq!(value, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_eviction_refetches() {
        let cache: BoundedCache<u32, u32> = BoundedCache::new("test", 2);
        let calls = AtomicUsize::new(0);

        for key in [1u32, 2, 3] {
            cache
                .get_or_try_fetch(key, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(key * 10)
                })
                .await
                .unwrap();
        }
        // Key 1 was evicted by key 3; fetching it again is a cold call,
        // observably equivalent to the first.
        let value = cache
            .get_or_try_fetch(1, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(10)
            })
            .await
            .unwrap();
        assert_eq!(value, 10);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_failures_are_not_memoized() {
        let cache: BoundedCache<&'static str, u32> = BoundedCache::new("test", 8);
        let calls = AtomicUsize::new(0);

        let first = cache
            .get_or_try_fetch("k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(anyhow!("timeout"))
            })
            .await;
        assert!(first.is_err());

        let second = cache
            .get_or_try_fetch("k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            })
            .await
            .unwrap();
        assert_eq!(second, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_lookups_single_flight() {
        let cache: Arc<BoundedCache<&'static str, u32>> = Arc::new(BoundedCache::new("test", 8));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_try_fetch("k", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok(99)
                    })
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 99);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
