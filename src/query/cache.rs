use log::debug;
use lru::LruCache;
use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;

use super::QueryKey;
use crate::error::{FinderError, FinderResult};
use crate::models::Mosque;

type SharedResult = FinderResult<Arc<Vec<Mosque>>>;

struct CacheEntry {
    mosques: Arc<Vec<Mosque>>,
    fetched_at: Instant,
}

/// A cached list and whether it is still inside the freshness window.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedList {
    pub mosques: Arc<Vec<Mosque>>,
    pub fresh: bool,
}

/// Query-scoped mosque lists with request de-duplication.
///
/// Concurrent fetches for an equal key share one in-flight request; every
/// caller receives the same result.
pub struct QueryCache {
    entries: Mutex<LruCache<QueryKey, CacheEntry>>,
    in_flight: Mutex<HashMap<QueryKey, Arc<OnceCell<SharedResult>>>>,
    ttl: Duration,
}

impl QueryCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);

        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            in_flight: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn lookup(&self, key: &QueryKey) -> Option<CachedList> {
        let mut entries = self.entries.lock().ok()?;
        let entry = entries.get(key)?;
        let fresh = entry.fetched_at.elapsed() < self.ttl;
        debug!(
            "Cache hit for {} ({})",
            key,
            if fresh { "fresh" } else { "stale" }
        );

        Some(CachedList {
            mosques: entry.mosques.clone(),
            fresh,
        })
    }

    /// Runs `fetch` unless a request for `key` is already in flight, in which
    /// case the caller waits for that request instead.
    pub async fn fetch<F, Fut>(&self, key: &QueryKey, fetch: F) -> SharedResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FinderResult<Vec<Mosque>>>,
    {
        let cell = {
            let mut in_flight = self
                .in_flight
                .lock()
                .map_err(|_| FinderError::Storage("Failed to acquire in-flight lock".into()))?;
            in_flight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = cell
            .get_or_init(|| async move {
                debug!("Fetching {}", key);
                fetch().await.map(Arc::new)
            })
            .await
            .clone();

        // The first caller to get here stores the result and retires the request
        if let Ok(mut in_flight) = self.in_flight.lock() {
            let owns_request = in_flight
                .get(key)
                .is_some_and(|current| Arc::ptr_eq(current, &cell));
            if owns_request {
                if let (Ok(mosques), Ok(mut entries)) = (&result, self.entries.lock()) {
                    entries.put(
                        key.clone(),
                        CacheEntry {
                            mosques: mosques.clone(),
                            fetched_at: Instant::now(),
                        },
                    );
                }
                in_flight.remove(key);
            }
        }

        result
    }

    pub fn invalidate(&self, key: &QueryKey) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.pop(key);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
            debug!("Cleared query cache");
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Coordinate, RadiusMeters};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn key(facility: &str) -> QueryKey {
        QueryKey::new(
            vec![facility.into()],
            Coordinate::new(21.42, 39.82),
            RadiusMeters::new(5000).unwrap(),
        )
    }

    fn mosque(id: &str) -> Mosque {
        serde_json::from_value(serde_json::json!({
            "id": id, "name": id, "position": [39.82, 21.42]
        }))
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_goes_stale_after_ttl() {
        let cache = QueryCache::new(8, Duration::from_secs(300));
        let k = key("a");

        cache.fetch(&k, || async { Ok(vec![mosque("m1")]) }).await.unwrap();
        assert!(cache.lookup(&k).unwrap().fresh);

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.lookup(&k).unwrap().fresh);

        tokio::time::advance(Duration::from_secs(2)).await;
        let cached = cache.lookup(&k).unwrap();
        assert!(!cached.fresh);
        assert_eq!(cached.mosques[0].id, "m1");
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_request() {
        let cache = QueryCache::new(8, Duration::from_secs(300));
        let (call_count, notify) = (AtomicUsize::new(0), Notify::new());
        let (calls, gate) = (&call_count, &notify);
        let k = key("a");

        let fetch = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            gate.notified().await;
            Ok(vec![mosque("m1")])
        };

        // join! polls in order: both fetches are waiting before the gate opens
        let (a, b, ()) = tokio::join!(cache.fetch(&k, fetch), cache.fetch(&k, fetch), async {
            assert_eq!(cache.in_flight(), 1);
            gate.notify_one();
        });

        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.in_flight(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let cache = QueryCache::new(8, Duration::from_secs(300));
        let k = key("a");

        let result = cache
            .fetch(&k, || async { Err(FinderError::Network("down".into())) })
            .await;
        assert_eq!(result, Err(FinderError::Network("down".into())));
        assert!(cache.lookup(&k).is_none());
        assert_eq!(cache.in_flight(), 0);

        // The next fetch issues a new request
        let result = cache.fetch(&k, || async { Ok(vec![mosque("m2")]) }).await;
        assert_eq!(result.unwrap()[0].id, "m2");
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recent_key() {
        let cache = QueryCache::new(2, Duration::from_secs(300));
        for facility in ["a", "b", "c"] {
            cache
                .fetch(&key(facility), || async { Ok(Vec::new()) })
                .await
                .unwrap();
        }

        assert!(cache.lookup(&key("a")).is_none());
        assert!(cache.lookup(&key("b")).is_some());
        assert!(cache.lookup(&key("c")).is_some());

        cache.invalidate(&key("b"));
        assert!(cache.lookup(&key("b")).is_none());
        cache.clear();
        assert!(cache.is_empty());
    }
}
