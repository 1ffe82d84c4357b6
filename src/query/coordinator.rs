use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{FallbackPolicy, MosqueQueryState, QueryCache, QueryKey, QueryOutcome};
use crate::api_client::MosqueBackend;
use crate::error::FinderResult;
use crate::filter_store::FilterState;
use crate::location::LocationState;
use crate::models::{Coordinate, Mosque};

#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Map centre and query origin while no fix is known.
    pub fallback: Coordinate,
    pub policy: FallbackPolicy,
    /// Freshness window of cached lists.
    pub ttl: Duration,
    pub cache_capacity: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            // Masjid al-Haram, Mecca
            fallback: Coordinate::new(21.4225, 39.8262),
            policy: FallbackPolicy::Defer,
            ttl: Duration::from_secs(5 * 60),
            cache_capacity: 32,
        }
    }
}

/// Turns filter state and the user's location into one logical mosque query.
///
/// Consumers read [`MosqueQueryState`] through [`subscribe`](Self::subscribe).
/// Responses for a key that is no longer current are dropped on arrival.
pub struct MosqueQueryCoordinator<B: MosqueBackend> {
    backend: Arc<B>,
    filters: watch::Receiver<FilterState>,
    location: watch::Receiver<LocationState>,
    cache: QueryCache,
    state_tx: watch::Sender<MosqueQueryState>,
    options: QueryOptions,
}

impl<B: MosqueBackend + 'static> MosqueQueryCoordinator<B> {
    pub fn new(
        backend: Arc<B>,
        filters: watch::Receiver<FilterState>,
        location: watch::Receiver<LocationState>,
        options: QueryOptions,
    ) -> Self {
        let (state_tx, _) = watch::channel(MosqueQueryState::idle(options.fallback));

        Self {
            backend,
            filters,
            location,
            cache: QueryCache::new(options.cache_capacity, options.ttl),
            state_tx,
            options,
        }
    }

    pub fn state(&self) -> MosqueQueryState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MosqueQueryState> {
        self.state_tx.subscribe()
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Key for the current inputs, or `None` while the request is deferred.
    /// The flag is set when the key uses the fallback coordinate.
    pub fn current_key(&self) -> (Option<QueryKey>, bool) {
        let location = self.location.borrow().clone();

        match location.location() {
            Some(user) => (
                Some(QueryKey::from_filters(&self.filters.borrow(), user.coordinate)),
                false,
            ),
            None if self.options.policy == FallbackPolicy::Defer && location.awaiting_fix() => {
                (None, true)
            }
            None => (
                Some(QueryKey::from_filters(
                    &self.filters.borrow(),
                    self.options.fallback,
                )),
                true,
            ),
        }
    }

    /// Publishes the list for the current inputs, fetching it when the cache
    /// has nothing fresh.
    pub async fn refresh(&self) -> QueryOutcome {
        self.run(false).await
    }

    /// Re-issues the current query even when a fresh list is cached.
    pub async fn retry(&self) -> QueryOutcome {
        self.run(true).await
    }

    /// Detail lookup for a single mosque.
    pub async fn mosque(&self, id: &str) -> FinderResult<Mosque> {
        self.backend.get_mosque(id).await
    }

    /// Re-runs the query whenever filters or location change.
    ///
    /// Each change spawns its own pass, so a slow request never delays the
    /// next key; late responses are discarded by [`refresh`](Self::refresh).
    pub fn spawn_watch(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        let mut filters = self.filters.clone();
        let mut location = self.location.clone();

        tokio::spawn(async move {
            loop {
                let pass = Arc::clone(&coordinator);
                tokio::spawn(async move {
                    if let QueryOutcome::Failed(e) = pass.refresh().await {
                        warn!("Mosque query failed: {}", e);
                    }
                });

                tokio::select! {
                    changed = filters.changed() => if changed.is_err() { break },
                    changed = location.changed() => if changed.is_err() { break },
                }
            }
            debug!("Query watch stopped, inputs dropped");
        })
    }

    async fn run(&self, force: bool) -> QueryOutcome {
        let (key, degraded) = self.current_key();
        let center = key
            .as_ref()
            .map(QueryKey::coordinate)
            .unwrap_or(self.options.fallback);

        let Some(key) = key else {
            debug!("Waiting for a position fix before querying");
            self.state_tx.send_modify(|state| {
                state.key = None;
                state.loading = false;
                state.degraded = true;
                state.center = center;
            });
            return QueryOutcome::Deferred;
        };

        let cached = self.cache.lookup(&key);
        if let Some(cached) = cached.as_ref().filter(|c| c.fresh && !force) {
            self.state_tx.send_replace(MosqueQueryState {
                key: Some(key),
                mosques: Some(cached.mosques.clone()),
                loading: false,
                error: None,
                degraded,
                center,
            });
            return QueryOutcome::CacheHit;
        }

        self.state_tx.send_modify(|state| {
            if state.key.as_ref() != Some(&key) {
                state.error = None;
                state.mosques = None;
            }
            // Stale entries stay visible while revalidating
            if let Some(cached) = &cached {
                state.mosques = Some(cached.mosques.clone());
            }
            state.key = Some(key.clone());
            state.loading = true;
            state.degraded = degraded;
            state.center = center;
        });

        if force {
            self.cache.invalidate(&key);
        }

        let backend = Arc::clone(&self.backend);
        let request = key.to_request();
        let result = self
            .cache
            .fetch(&key, || async move { backend.filter_mosques(&request).await })
            .await;

        let mut outcome = QueryOutcome::Discarded;
        self.state_tx.send_if_modified(|state| {
            if state.key.as_ref() != Some(&key) {
                return false;
            }
            match &result {
                Ok(mosques) => {
                    state.mosques = Some(mosques.clone());
                    state.error = None;
                    outcome = QueryOutcome::Applied;
                }
                Err(e) => {
                    // Keep whatever list is visible
                    state.error = Some(e.clone());
                    outcome = QueryOutcome::Failed(e.clone());
                }
            }
            state.loading = false;
            true
        });

        match &outcome {
            QueryOutcome::Applied => {
                if let Ok(mosques) = &result {
                    info!("Loaded {} mosques for {}", mosques.len(), key);
                }
            }
            QueryOutcome::Discarded => debug!("Discarding stale response for {}", key),
            _ => {}
        }
        outcome
    }
}
