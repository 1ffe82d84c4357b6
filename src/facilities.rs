use log::{info, warn};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use crate::api_client::MosqueBackend;
use crate::error::{FinderError, FinderResult};
use crate::models::{FacilityId, MosqueFacility};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacilitiesState {
    pub facilities: Option<Arc<Vec<MosqueFacility>>>,
    pub loading: bool,
    pub error: Option<FinderError>,
}

/// Facilities offered by the backend, for building the filter sheet.
///
/// A failed reload keeps the last list that loaded.
pub struct FacilityCatalog<B: MosqueBackend> {
    backend: Arc<B>,
    state_tx: watch::Sender<FacilitiesState>,
    load_lock: Mutex<()>,
}

impl<B: MosqueBackend> FacilityCatalog<B> {
    pub fn new(backend: Arc<B>) -> Self {
        let (state_tx, _) = watch::channel(FacilitiesState::default());
        Self {
            backend,
            state_tx,
            load_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> FacilitiesState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FacilitiesState> {
        self.state_tx.subscribe()
    }

    pub async fn load(&self) -> FinderResult<Arc<Vec<MosqueFacility>>> {
        // A caller arriving during a load gets that load's result
        let in_progress = self.state_tx.borrow().loading;
        let _guard = self.load_lock.lock().await;
        if in_progress {
            let state = self.state();
            if let (Some(facilities), None) = (state.facilities, state.error) {
                return Ok(facilities);
            }
        }

        self.state_tx.send_modify(|state| state.loading = true);
        let result = self.backend.list_facilities().await.map(Arc::new);

        self.state_tx.send_modify(|state| {
            state.loading = false;
            match &result {
                Ok(facilities) => {
                    state.facilities = Some(facilities.clone());
                    state.error = None;
                }
                Err(e) => state.error = Some(e.clone()),
            }
        });

        match result {
            Ok(facilities) => {
                info!("Loaded {} facilities", facilities.len());
                Ok(facilities)
            }
            Err(e) => {
                warn!("Failed to load facilities: {}", e);
                Err(e)
            }
        }
    }

    pub fn label(&self, id: &FacilityId) -> Option<String> {
        self.state_tx.borrow().facilities.as_ref().and_then(|facilities| {
            facilities
                .iter()
                .find(|f| f.id == id.as_str())
                .map(|f| f.facilities.clone())
        })
    }
}
