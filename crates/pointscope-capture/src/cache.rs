//! # TTL Cache with Single-Flight
//!
//! Caches successful upstream fetches for a fixed time-to-live and collapses
//! concurrent fetches of the same key into one in-flight request.
//!
//! ```text
//! caller A ──┐                         ┌──▶ A
//! caller B ──┼──▶ [in-flight: key] ────┼──▶ B      (one producer call)
//! caller C ──┘        │                └──▶ C
//!                     ▼
//!              Ok  → put(key, value, ttl)
//!              Err → stale entry (if any) flagged `stale`
//! ```
//!
//! Reads never block on a fetch. Writes happen only after success. The
//! in-flight guard is the only lock whose scope spans the upstream call, and
//! it is held by the shared future rather than by a mutex guard. When the last
//! waiter is dropped mid-fetch the entry is removed and the fetch cancelled.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Cached value with its freshness window
#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    pub value: V,
    pub fetched_at: Instant,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    pub fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }

    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.fetched_at)
    }
}

/// Value returned by `single_flight`
#[derive(Clone, Debug, PartialEq)]
pub struct Fetched<V> {
    pub value: V,
    /// Served from an expired entry because the fetch failed
    pub stale: bool,
}

type InFlight<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

struct CacheInner<K, V, E> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    in_flight: Mutex<HashMap<K, InFlight<V, E>>>,
}

impl<K: Eq + Hash, V, E> CacheInner<K, V, E> {
    fn store(&self, key: K, value: V, ttl: Duration) {
        let now = Instant::now();
        self.entries.write().insert(
            key,
            CacheEntry {
                value,
                fetched_at: now,
                expires_at: now + ttl,
            },
        );
    }
}

/// A waiter's handle on an in-flight fetch
///
/// Dropped before completion by the last waiter, it removes the map entry so
/// the abandoned fetch does not linger.
struct Waiter<'a, K: Eq + Hash, V, E> {
    inner: &'a CacheInner<K, V, E>,
    key: &'a K,
    fetch: InFlight<V, E>,
    done: bool,
}

impl<K: Eq + Hash, V, E> Drop for Waiter<'_, K, V, E> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let mut in_flight = self.inner.in_flight.lock();
        // Clones are only made under this lock: ours plus the map's means no one else waits
        let abandoned = in_flight
            .get(self.key)
            .is_some_and(|entry| entry.ptr_eq(&self.fetch) && entry.strong_count() == Some(2));
        if abandoned {
            tracing::debug!("Last waiter dropped, cancelling in-flight fetch");
            in_flight.remove(self.key);
        }
    }
}

/// Injectable TTL cache; clones share state, `new()` instances are isolated
pub struct TtlCache<K, V, E> {
    inner: Arc<CacheInner<K, V, E>>,
}

impl<K, V, E> Clone for TtlCache<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V, E> Default for TtlCache<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, E> TtlCache<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Entry for `key`, fresh or expired
    pub fn get(&self, key: &K) -> Option<CacheEntry<V>> {
        self.inner.entries.read().get(key).cloned()
    }

    pub fn put(&self, key: K, value: V, ttl: Duration) {
        self.inner.store(key, value, ttl);
    }

    pub fn invalidate(&self, key: &K) {
        self.inner.entries.write().remove(key);
    }

    /// Number of fetches currently outstanding
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.lock().len()
    }

    /// Fresh cached value, or the result of the single outstanding fetch for `key`
    ///
    /// Latecomers attach to an in-flight fetch instead of calling `producer`.
    /// On failure an expired entry is served with `stale = true`; without one
    /// the error is returned.
    pub async fn single_flight<F, Fut>(
        &self,
        key: K,
        ttl: Duration,
        producer: F,
    ) -> Result<Fetched<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        if let Some(entry) = self.get(&key).filter(CacheEntry::is_fresh) {
            return Ok(Fetched {
                value: entry.value,
                stale: false,
            });
        }

        let fetch = {
            let mut in_flight = self.inner.in_flight.lock();
            match in_flight.get(&key) {
                Some(existing) => {
                    tracing::debug!("Joining in-flight fetch");
                    existing.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let task_key = key.clone();
                    let fetch = producer();
                    let shared = async move {
                        let result = fetch.await;
                        if let Ok(value) = &result {
                            inner.store(task_key.clone(), value.clone(), ttl);
                        }
                        inner.in_flight.lock().remove(&task_key);
                        result
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(key.clone(), shared.clone());
                    shared
                }
            }
        };

        let mut waiter = Waiter {
            inner: &self.inner,
            key: &key,
            fetch,
            done: false,
        };
        let result = (&mut waiter.fetch).await;
        waiter.done = true;
        drop(waiter);

        match result {
            Ok(value) => Ok(Fetched {
                value,
                stale: false,
            }),
            Err(err) => match self.get(&key) {
                Some(entry) => {
                    tracing::warn!(
                        age_secs = entry.age().as_secs(),
                        "Fetch failed, serving stale cache entry"
                    );
                    Ok(Fetched {
                        value: entry.value,
                        stale: true,
                    })
                }
                None => Err(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    type Cache = TtlCache<&'static str, u64, String>;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_put_get_expiry() {
        let cache = Cache::new();
        assert!(cache.get(&"k").is_none());

        cache.put("k", 5, TTL);
        assert!(cache.get(&"k").unwrap().is_fresh());

        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        let entry = cache.get(&"k").unwrap();
        assert!(!entry.is_fresh());
        assert_eq!(entry.value, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_entry_skips_producer() {
        let cache = Cache::new();
        cache.put("k", 1, TTL);

        let fetched = cache
            .single_flight("k", TTL, || async { Err::<u64, _>("unreachable".to_string()) })
            .await
            .unwrap();
        assert_eq!(fetched, Fetched { value: 1, stale: false });
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_fetch() {
        let cache = Cache::new();
        let calls = Arc::new(AtomicU32::new(0));

        let fetch = |cache: Cache, calls: Arc<AtomicU32>| async move {
            cache
                .single_flight("points", TTL, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok::<u64, String>(42)
                })
                .await
        };

        let (a, b, c) = tokio::join!(
            fetch(cache.clone(), Arc::clone(&calls)),
            fetch(cache.clone(), Arc::clone(&calls)),
            fetch(cache.clone(), Arc::clone(&calls)),
        );

        assert_eq!(a.unwrap().value, 42);
        assert_eq!(b.unwrap().value, 42);
        assert_eq!(c.unwrap().value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.in_flight(), 0);
        assert!(cache.get(&"points").unwrap().is_fresh());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_serves_stale() {
        let cache = Cache::new();
        cache.put("k", 7, TTL);
        tokio::time::advance(TTL * 2).await;

        let fetched = cache
            .single_flight("k", TTL, || async { Err::<u64, _>("down".to_string()) })
            .await
            .unwrap();
        assert_eq!(fetched, Fetched { value: 7, stale: true });
        // Failed fetch leaves the old entry untouched
        assert!(!cache.get(&"k").unwrap().is_fresh());
    }

    #[tokio::test]
    async fn test_failure_without_entry_propagates() {
        let cache = Cache::new();
        let err = cache
            .single_flight("k", TTL, || async { Err::<u64, _>("down".to_string()) })
            .await
            .unwrap_err();
        assert_eq!(err, "down");
        assert_eq!(cache.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let cache = Cache::new();
        cache.put("k", 1, TTL);
        cache.invalidate(&"k");

        let fetched = cache
            .single_flight("k", TTL, || async { Ok::<u64, String>(2) })
            .await
            .unwrap();
        assert_eq!(fetched.value, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_fetch_is_cleared() {
        let cache = Cache::new();
        let calls = Arc::new(AtomicU32::new(0));

        let producer = |calls: Arc<AtomicU32>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<u64, String>(9)
            }
        };

        let first = cache.single_flight("k", TTL, producer(Arc::clone(&calls)));
        let second = cache.single_flight("k", TTL, producer(Arc::clone(&calls)));
        let timed_out = tokio::time::timeout(Duration::from_secs(1), async {
            tokio::join!(first, second)
        })
        .await;
        assert!(timed_out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.in_flight(), 0);

        // A later caller starts a fresh fetch rather than resuming the dropped one
        let fetched = cache
            .single_flight("k", TTL, producer(Arc::clone(&calls)))
            .await
            .unwrap();
        assert_eq!(fetched.value, 9);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_surviving_waiter_keeps_fetch() {
        let cache = Cache::new();
        let slow = || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<u64, String>(3)
        };

        let kept = tokio::spawn({
            let cache = cache.clone();
            async move { cache.single_flight("k", TTL, slow).await }
        });
        tokio::task::yield_now().await;
        assert_eq!(cache.in_flight(), 1);

        let dropped = tokio::time::timeout(
            Duration::from_secs(1),
            cache.single_flight("k", TTL, || async { Err::<u64, _>("unused".to_string()) }),
        )
        .await;
        assert!(dropped.is_err());
        assert_eq!(cache.in_flight(), 1);

        assert_eq!(kept.await.unwrap().unwrap().value, 3);
        assert_eq!(cache.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_instances_are_isolated() {
        let a = Cache::new();
        let b = Cache::new();
        a.put("k", 1, TTL);
        assert!(b.get(&"k").is_none());
        assert!(a.clone().get(&"k").is_some());
    }
}
