//! Debounced place suggestions for the search bar.
//!
//! Every text change bumps a generation counter. A lookup only runs if its
//! generation is still current once the debounce window has passed, and its
//! result is only applied if the generation is still current when it
//! arrives. Results are therefore last-write-wins by the order the text was
//! typed, not the order the responses come back.

use log::{debug, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{FinderError, FinderResult};
use crate::filter_store::FilterStore;
use crate::models::{MapRegion, PlaceSuggestion};
use crate::places::{is_searchable, GeocodingService};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuggestionState {
    /// Text the suggestions belong to.
    pub text: String,
    pub suggestions: Vec<PlaceSuggestion>,
    pub loading: bool,
    pub error: Option<FinderError>,
}

pub struct SuggestionCoordinator<G: GeocodingService> {
    geocoder: Arc<G>,
    filters: Arc<FilterStore>,
    debounce: Duration,
    generation: AtomicU64,
    state_tx: watch::Sender<SuggestionState>,
    recenter_tx: watch::Sender<Option<MapRegion>>,
}

impl<G: GeocodingService + 'static> SuggestionCoordinator<G> {
    pub fn new(geocoder: Arc<G>, filters: Arc<FilterStore>, debounce: Duration) -> Self {
        let (state_tx, _) = watch::channel(SuggestionState::default());
        let (recenter_tx, _) = watch::channel(None);

        Self {
            geocoder,
            filters,
            debounce,
            generation: AtomicU64::new(0),
            state_tx,
            recenter_tx,
        }
    }

    pub fn state(&self) -> SuggestionState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SuggestionState> {
        self.state_tx.subscribe()
    }

    /// Map re-center requests, one per selected place.
    pub fn recenter_requests(&self) -> watch::Receiver<Option<MapRegion>> {
        self.recenter_tx.subscribe()
    }

    /// Records the new search text and schedules a lookup for it.
    ///
    /// Text of two characters or fewer clears the list without any network
    /// call. Returns the scheduled lookup, if any.
    pub async fn on_search_text_changed(self: &Arc<Self>, text: &str) -> Option<JoinHandle<()>> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.filters.set_search_query(text).await;

        if !is_searchable(text) {
            self.state_tx.send_replace(SuggestionState {
                text: text.to_string(),
                ..SuggestionState::default()
            });
            return None;
        }

        self.state_tx.send_modify(|state| {
            state.text = text.to_string();
            state.loading = true;
        });

        let coordinator = Arc::clone(self);
        let text = text.to_string();
        Some(tokio::spawn(async move {
            tokio::time::sleep(coordinator.debounce).await;
            if !coordinator.is_current(generation) {
                return;
            }

            let result = coordinator.geocoder.autocomplete(&text).await;
            coordinator.apply(generation, &text, result);
        }))
    }

    /// Resolves the picked place, asks the map to re-center on it and records
    /// it as a recent search. The list is closed whether or not the lookup
    /// succeeds.
    pub async fn select(&self, suggestion: &PlaceSuggestion) -> FinderResult<MapRegion> {
        // Supersede any pending lookup
        self.generation.fetch_add(1, Ordering::SeqCst);

        self.filters
            .add_recent_search(suggestion.to_recent_search())
            .await;
        let result = self.geocoder.place_location(&suggestion.place_id).await;

        self.state_tx.send_modify(|state| {
            state.suggestions.clear();
            state.loading = false;
            state.error = None;
        });

        let coordinate = result.inspect_err(|e| {
            warn!("Failed to resolve place {}: {}", suggestion.place_id, e);
        })?;
        let region = MapRegion::around(coordinate);
        self.recenter_tx.send_replace(Some(region));
        debug!("Re-centering map on {}", coordinate);
        Ok(region)
    }

    /// Closes the list and drops any pending lookup.
    pub fn dismiss(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.state_tx.send_modify(|state| {
            state.suggestions.clear();
            state.loading = false;
        });
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn apply(&self, generation: u64, text: &str, result: FinderResult<Vec<PlaceSuggestion>>) {
        self.state_tx.send_if_modified(|state| {
            if !self.is_current(generation) {
                debug!("Dropping suggestions for superseded text {:?}", text);
                return false;
            }
            state.loading = false;
            match result {
                Ok(suggestions) => {
                    state.suggestions = suggestions;
                    state.error = None;
                }
                Err(e) => {
                    warn!("Suggestion lookup for {:?} failed: {}", text, e);
                    state.error = Some(e);
                }
            }
            true
        });
    }
}
