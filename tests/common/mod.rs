#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mosque_finder::api_client::{FilterMosquesRequest, MosqueBackend};
use mosque_finder::error::{FinderError, FinderResult};
use mosque_finder::location::{GeocodedAddress, LocationProvider, PermissionStatus};
use mosque_finder::models::{Coordinate, Mosque, MosqueFacility, UserLocation};

pub fn mosque(id: &str, coordinate: Coordinate) -> Mosque {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "name": format!("Masjid {}", id),
        "address": "Jl. Merdeka",
        "position": [coordinate.longitude, coordinate.latitude],
        "facilities": ["wudhuMale"],
    }))
    .unwrap()
}

pub fn location(latitude: f64, longitude: f64) -> UserLocation {
    let coordinate = Coordinate::new(latitude, longitude);
    UserLocation::new(coordinate, coordinate.to_string())
}

/// Backend answering every filter request with one mosque at the request's
/// origin. Requests whose latitude matches `slow_latitude` take longer.
pub struct FakeBackend {
    pub requests: Mutex<Vec<FilterMosquesRequest>>,
    pub delay: Duration,
    pub slow_latitude: Option<(f64, Duration)>,
    pub failing: AtomicBool,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            slow_latitude: None,
            failing: AtomicBool::new(false),
        }
    }

    pub fn requests(&self) -> Vec<FilterMosquesRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl MosqueBackend for FakeBackend {
    async fn filter_mosques(&self, request: &FilterMosquesRequest) -> FinderResult<Vec<Mosque>> {
        self.requests.lock().unwrap().push(request.clone());

        let latitude = request.current_lat.unwrap_or_default();
        let delay = match self.slow_latitude {
            Some((slow, delay)) if slow == latitude => delay,
            _ => self.delay,
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(FinderError::Timeout("filterMosque".into()));
        }
        let origin = Coordinate::new(latitude, request.current_lng.unwrap_or_default());
        Ok(vec![mosque(&format!("near-{}", latitude), origin)])
    }

    async fn list_facilities(&self) -> FinderResult<Vec<MosqueFacility>> {
        Ok(vec![MosqueFacility {
            id: "wudhuMale".into(),
            facilities: "Wudhu area (men)".into(),
        }])
    }

    async fn get_mosque(&self, id: &str) -> FinderResult<Mosque> {
        Ok(mosque(id, Coordinate::new(0.0, 0.0)))
    }
}

/// Location provider replaying a queue of fixes.
pub struct ScriptedProvider {
    pub permission: PermissionStatus,
    pub fixes: Mutex<VecDeque<FinderResult<Coordinate>>>,
    pub delay: Duration,
    pub position_calls: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    pub fn new(fixes: Vec<FinderResult<Coordinate>>) -> Self {
        Self {
            permission: PermissionStatus::Granted,
            fixes: Mutex::new(fixes.into()),
            delay: Duration::ZERO,
            position_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn denied() -> Self {
        Self {
            permission: PermissionStatus::Denied,
            ..Self::new(Vec::new())
        }
    }
}

#[async_trait]
impl LocationProvider for ScriptedProvider {
    async fn request_permission(&self) -> FinderResult<PermissionStatus> {
        Ok(self.permission)
    }

    async fn current_position(&self) -> FinderResult<Coordinate> {
        self.position_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.fixes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(FinderError::Position("no fix".into())))
    }

    async fn reverse_geocode(&self, _coordinate: Coordinate) -> FinderResult<Vec<GeocodedAddress>> {
        Ok(vec![GeocodedAddress {
            name: Some("Jl. Thamrin".into()),
            region: Some("Jakarta".into()),
            formatted: None,
        }])
    }
}
