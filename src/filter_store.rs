//! Filter inputs and search history shared by every consumer of the map.
//!
//! The store is the only writer of [`FilterState`]. Readers either take a
//! [`FilterStore::snapshot`] or hold a `watch` receiver from
//! [`FilterStore::subscribe`] and react to changes.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use crate::error::FinderResult;
use crate::models::{FacilityId, RadiusMeters, RecentSearch};
use crate::storage::KeyValueStore;

/// Name of the persisted record holding the whole filter state.
pub const FILTER_RECORD_KEY: &str = "mosque-filter";
pub const MAX_RECENT_SEARCHES: usize = 5;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterState {
    pub selected_facilities: BTreeSet<FacilityId>,
    pub radius_meters: RadiusMeters,
    pub search_query: String,
    /// Newest first, unique by id, at most [`MAX_RECENT_SEARCHES`].
    pub recent_searches: Vec<RecentSearch>,
}

impl FilterState {
    fn push_recent(&mut self, search: RecentSearch) {
        self.recent_searches.retain(|existing| existing.id != search.id);
        self.recent_searches.insert(0, search);
        self.recent_searches.truncate(MAX_RECENT_SEARCHES);
    }

    // A hand-edited or older record may violate the recent-search invariant
    fn normalized(mut self) -> Self {
        let stored = std::mem::take(&mut self.recent_searches);
        for search in stored.into_iter().rev() {
            self.push_recent(search);
        }
        self
    }
}

pub struct FilterStore {
    state: Mutex<FilterState>,
    watch_tx: watch::Sender<FilterState>,
    storage: Arc<dyn KeyValueStore>,
    unsaved: AtomicBool,
}

impl FilterStore {
    /// Hydrates from storage, falling back to defaults when the record is
    /// missing or unreadable.
    pub async fn load(storage: Arc<dyn KeyValueStore>) -> Self {
        let state = match storage.load(FILTER_RECORD_KEY).await {
            Ok(Some(json)) => match serde_json::from_str::<FilterState>(&json) {
                Ok(state) => {
                    info!("Restored filter state from storage");
                    state.normalized()
                }
                Err(e) => {
                    warn!("Stored filter state is corrupt, using defaults: {}", e);
                    FilterState::default()
                }
            },
            Ok(None) => FilterState::default(),
            Err(e) => {
                warn!("Failed to load filter state, using defaults: {}", e);
                FilterState::default()
            }
        };

        let (watch_tx, _) = watch::channel(state.clone());

        Self {
            state: Mutex::new(state),
            watch_tx,
            storage,
            unsaved: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> FilterState {
        self.watch_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FilterState> {
        self.watch_tx.subscribe()
    }

    /// True when the last write to storage failed and has not been retried yet.
    pub fn has_unsaved_changes(&self) -> bool {
        self.unsaved.load(Ordering::SeqCst)
    }

    /// Replaces the selection wholesale. Unknown ids are kept; they simply
    /// match no mosque.
    pub async fn set_facilities(&self, facilities: impl IntoIterator<Item = FacilityId>) {
        let facilities: BTreeSet<FacilityId> = facilities.into_iter().collect();
        self.update(|state| state.selected_facilities = facilities)
            .await;
    }

    pub async fn toggle_facility(&self, facility: FacilityId) {
        self.update(|state| {
            if !state.selected_facilities.remove(&facility) {
                state.selected_facilities.insert(facility);
            }
        })
        .await;
    }

    pub async fn set_radius(&self, radius: RadiusMeters) {
        self.update(|state| state.radius_meters = radius).await;
    }

    pub async fn set_search_query(&self, query: impl Into<String>) {
        let query = query.into();
        self.update(|state| state.search_query = query).await;
    }

    pub async fn add_recent_search(&self, search: RecentSearch) {
        self.update(|state| state.push_recent(search)).await;
    }

    pub async fn clear_recent_searches(&self) {
        self.update(|state| state.recent_searches.clear()).await;
    }

    /// Retries a previously failed write.
    pub async fn flush(&self) -> FinderResult<()> {
        let state = self.state.lock().await;
        if !self.unsaved.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.persist(&state).await
    }

    async fn update<F: FnOnce(&mut FilterState)>(&self, mutation_fn: F) {
        let mut state = self.state.lock().await;

        mutation_fn(&mut state);

        let modified = *self.watch_tx.borrow() != *state;
        if !modified && !self.unsaved.load(Ordering::SeqCst) {
            debug!("Filter state unchanged, skipping write");
            return;
        }

        // In-memory state stays authoritative; the next mutation rewrites everything
        if let Err(e) = self.persist(&state).await {
            warn!("Failed to persist filter state: {}", e);
        }

        if modified {
            self.watch_tx.send_replace(state.clone());
        }
    }

    async fn persist(&self, state: &FilterState) -> FinderResult<()> {
        let json = serde_json::to_string(state).map_err(|e| {
            crate::error::FinderError::Storage(format!("failed to encode filter state: {}", e))
        })?;

        match self.storage.save(FILTER_RECORD_KEY, &json).await {
            Ok(()) => {
                self.unsaved.store(false, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                self.unsaved.store(true, Ordering::SeqCst);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FinderError;
    use crate::storage::{JsonFileStore, MemoryStore};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn search(id: &str) -> RecentSearch {
        RecentSearch {
            id: id.to_string(),
            name: format!("Mosque {}", id),
            location: "Jakarta".to_string(),
        }
    }

    /// Fails every write while `failing` is set.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        failing: AtomicBool,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn load(&self, key: &str) -> FinderResult<Option<String>> {
            self.inner.load(key).await
        }

        async fn save(&self, key: &str, value: &str) -> FinderResult<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(FinderError::Storage("disk full".into()));
            }
            self.inner.save(key, value).await
        }
    }

    #[tokio::test]
    async fn test_defaults_without_stored_record() {
        let store = FilterStore::load(Arc::new(MemoryStore::new())).await;
        let state = store.snapshot();

        assert!(state.selected_facilities.is_empty());
        assert_eq!(state.radius_meters.get(), 5000);
        assert_eq!(state.search_query, "");
        assert!(state.recent_searches.is_empty());
    }

    #[tokio::test]
    async fn test_add_recent_search_is_idempotent() {
        let store = FilterStore::load(Arc::new(MemoryStore::new())).await;
        let entry = RecentSearch {
            id: "p1".into(),
            name: "A".into(),
            location: "X".into(),
        };

        store.add_recent_search(entry.clone()).await;
        store.add_recent_search(entry.clone()).await;

        let recents = store.snapshot().recent_searches;
        assert_eq!(recents.len(), 1);
        assert_eq!(recents[0], entry);
    }

    #[tokio::test]
    async fn test_add_recent_search_evicts_oldest() {
        let store = FilterStore::load(Arc::new(MemoryStore::new())).await;
        for id in ["1", "2", "3", "4", "5", "6"] {
            store.add_recent_search(search(id)).await;
        }

        let ids: Vec<String> = store
            .snapshot()
            .recent_searches
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["6", "5", "4", "3", "2"]);
    }

    #[tokio::test]
    async fn test_re_adding_moves_entry_to_head() {
        let store = FilterStore::load(Arc::new(MemoryStore::new())).await;
        store.add_recent_search(search("a")).await;
        store.add_recent_search(search("b")).await;
        store.add_recent_search(search("a")).await;

        let ids: Vec<String> = store
            .snapshot()
            .recent_searches
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_toggle_and_replace_facilities() {
        let store = FilterStore::load(Arc::new(MemoryStore::new())).await;

        store.toggle_facility("wudhuMale".into()).await;
        store.toggle_facility("salahFemale".into()).await;
        store.toggle_facility("wudhuMale".into()).await;
        assert_eq!(
            store.snapshot().selected_facilities,
            BTreeSet::from([FacilityId::from("salahFemale")])
        );

        store
            .set_facilities(vec!["b".into(), "a".into(), "a".into()])
            .await;
        assert_eq!(
            store.snapshot().selected_facilities,
            BTreeSet::from([FacilityId::from("a"), FacilityId::from("b")])
        );
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let store = FilterStore::load(Arc::new(MemoryStore::new())).await;
        let mut rx = store.subscribe();

        store.set_search_query("masjid").await;
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().search_query, "masjid");

        // Same value again does not notify
        store.set_search_query("masjid").await;
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let temp_dir = TempDir::new().unwrap();
        let storage: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new(temp_dir.path()));

        {
            let store = FilterStore::load(storage.clone()).await;
            store.set_radius(RadiusMeters::new(1500).unwrap()).await;
            store.set_facilities(vec!["jummahMale".into()]).await;
            store.add_recent_search(search("p9")).await;
        }

        let restored = FilterStore::load(storage).await.snapshot();
        assert_eq!(restored.radius_meters.get(), 1500);
        assert!(restored
            .selected_facilities
            .contains(&FacilityId::from("jummahMale")));
        assert_eq!(restored.recent_searches, vec![search("p9")]);
    }

    #[tokio::test]
    async fn test_persisted_layout_uses_camel_case() {
        let storage = Arc::new(MemoryStore::new());
        let store = FilterStore::load(storage.clone()).await;
        store.set_search_query("abc").await;

        let json = storage.load(FILTER_RECORD_KEY).await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["radiusMeters"], 5000);
        assert_eq!(value["searchQuery"], "abc");
        assert!(value["selectedFacilities"].is_array());
        assert!(value["recentSearches"].is_array());
    }

    #[tokio::test]
    async fn test_corrupt_record_falls_back_to_defaults() {
        let storage = Arc::new(MemoryStore::new());
        storage
            .save(FILTER_RECORD_KEY, "{not json")
            .await
            .unwrap();

        let store = FilterStore::load(storage).await;
        assert_eq!(store.snapshot(), FilterState::default());
    }

    #[tokio::test]
    async fn test_stored_recents_are_normalized() {
        let storage = Arc::new(MemoryStore::new());
        let stored = serde_json::json!({
            "recentSearches": [
                {"id": "a", "name": "A", "location": "X"},
                {"id": "a", "name": "A", "location": "X"},
                {"id": "b", "name": "B", "location": "X"},
                {"id": "c", "name": "C", "location": "X"},
                {"id": "d", "name": "D", "location": "X"},
                {"id": "e", "name": "E", "location": "X"},
                {"id": "f", "name": "F", "location": "X"}
            ]
        });
        storage
            .save(FILTER_RECORD_KEY, &stored.to_string())
            .await
            .unwrap();

        let state = FilterStore::load(storage).await.snapshot();
        let ids: Vec<&str> = state.recent_searches.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(state.radius_meters.get(), 5000);
    }

    #[tokio::test]
    async fn test_failed_write_is_non_fatal_and_retried() {
        let storage = Arc::new(FlakyStore::default());
        let store = FilterStore::load(storage.clone()).await;

        storage.failing.store(true, Ordering::SeqCst);
        store.set_search_query("first").await;
        assert_eq!(store.snapshot().search_query, "first");
        assert!(store.has_unsaved_changes());

        storage.failing.store(false, Ordering::SeqCst);
        store.add_recent_search(search("p1")).await;
        assert!(!store.has_unsaved_changes());

        let json = storage.load(FILTER_RECORD_KEY).await.unwrap().unwrap();
        let saved: FilterState = serde_json::from_str(&json).unwrap();
        assert_eq!(saved.search_query, "first");
        assert_eq!(saved.recent_searches.len(), 1);
    }

    #[tokio::test]
    async fn test_flush_retries_outstanding_write() {
        let storage = Arc::new(FlakyStore::default());
        let store = FilterStore::load(storage.clone()).await;

        storage.failing.store(true, Ordering::SeqCst);
        store.set_search_query("pending").await;
        assert!(store.flush().await.is_err());

        storage.failing.store(false, Ordering::SeqCst);
        store.flush().await.unwrap();
        assert!(!store.has_unsaved_changes());

        let writes = storage.writes.load(Ordering::SeqCst);
        store.flush().await.unwrap();
        assert_eq!(storage.writes.load(Ordering::SeqCst), writes);
    }
}
