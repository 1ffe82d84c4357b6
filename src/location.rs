//! Device location: permission, position fixes and reverse geocoding.
//!
//! [`LocationSession`] is the only component that talks to the platform
//! [`LocationProvider`]. Everything else reads the published
//! [`LocationState`] through [`LocationSession::subscribe`].

use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use crate::error::{FinderError, FinderResult};
use crate::models::{Coordinate, UserLocation};
use crate::places::GooglePlacesClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// One reverse-geocoding match, reduced to the parts used for display.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeocodedAddress {
    pub name: Option<String>,
    pub region: Option<String>,
    pub formatted: Option<String>,
}

impl GeocodedAddress {
    /// `"{name}, {region}"`, degrading to whatever is known.
    pub fn display(&self) -> Option<String> {
        match (&self.name, &self.region) {
            (Some(name), Some(region)) => Some(format!("{}, {}", name, region)),
            (Some(part), None) | (None, Some(part)) => Some(part.clone()),
            (None, None) => self.formatted.clone(),
        }
    }
}

/// Platform location facilities.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn request_permission(&self) -> FinderResult<PermissionStatus>;
    async fn current_position(&self) -> FinderResult<Coordinate>;
    async fn reverse_geocode(&self, coordinate: Coordinate) -> FinderResult<Vec<GeocodedAddress>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocationState {
    Unrequested,
    PermissionDenied,
    Acquiring,
    Available(UserLocation),
    Refreshing(UserLocation),
}

impl LocationState {
    pub fn location(&self) -> Option<&UserLocation> {
        match self {
            LocationState::Available(location) | LocationState::Refreshing(location) => {
                Some(location)
            }
            _ => None,
        }
    }

    /// A real fix may still arrive without further user action.
    pub fn awaiting_fix(&self) -> bool {
        matches!(self, LocationState::Unrequested | LocationState::Acquiring)
    }
}

pub struct LocationSession<P: LocationProvider> {
    provider: P,
    state_tx: watch::Sender<LocationState>,
    fix_lock: Mutex<()>,
}

impl<P: LocationProvider> LocationSession<P> {
    pub fn new(provider: P) -> Self {
        let (state_tx, _) = watch::channel(LocationState::Unrequested);
        Self {
            provider,
            state_tx,
            fix_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> LocationState {
        self.state_tx.borrow().clone()
    }

    pub fn current_location(&self) -> Option<UserLocation> {
        self.state_tx.borrow().location().cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<LocationState> {
        self.state_tx.subscribe()
    }

    /// Requests permission and the first fix.
    ///
    /// Calling it again after a denial is the explicit user action that
    /// re-enters acquisition. A failed fix leaves the session in
    /// `Acquiring`; nothing retries automatically.
    pub async fn start(&self) -> FinderResult<UserLocation> {
        let _guard = self.fix_lock.lock().await;

        if let Some(location) = self.current_location() {
            return Ok(location);
        }

        if self.provider.request_permission().await? == PermissionStatus::Denied {
            info!("Location permission denied");
            self.state_tx.send_replace(LocationState::PermissionDenied);
            return Err(FinderError::PermissionDenied);
        }

        self.state_tx.send_replace(LocationState::Acquiring);
        let location = self.acquire().await.inspect_err(|e| {
            warn!("Initial position fix failed: {}", e);
        })?;

        info!("Location available: {}", location.address);
        self.state_tx
            .send_replace(LocationState::Available(location.clone()));
        Ok(location)
    }

    /// Replaces the held location with a fresh fix.
    ///
    /// Returns `Ok(None)` when another refresh is already in flight. On
    /// failure the previous location stays published.
    pub async fn refresh(&self) -> FinderResult<Option<UserLocation>> {
        let Ok(_guard) = self.fix_lock.try_lock() else {
            debug!("Location refresh already in flight, coalescing");
            return Ok(None);
        };

        let previous = match self.state() {
            LocationState::Available(location) => {
                self.state_tx
                    .send_replace(LocationState::Refreshing(location.clone()));
                Some(location)
            }
            LocationState::Acquiring => None,
            LocationState::PermissionDenied => return Err(FinderError::PermissionDenied),
            LocationState::Unrequested => {
                return Err(FinderError::Position("location session not started".into()))
            }
            LocationState::Refreshing(_) => return Ok(None),
        };

        match self.acquire().await {
            Ok(location) => {
                debug!("Location refreshed: {}", location.address);
                self.state_tx
                    .send_replace(LocationState::Available(location.clone()));
                Ok(Some(location))
            }
            Err(e) => {
                warn!("Location refresh failed, keeping last fix: {}", e);
                if let Some(previous) = previous {
                    self.state_tx.send_replace(LocationState::Available(previous));
                }
                Err(e)
            }
        }
    }

    async fn acquire(&self) -> FinderResult<UserLocation> {
        let coordinate = self.provider.current_position().await?;
        let addresses = self.provider.reverse_geocode(coordinate).await?;
        let address = addresses
            .iter()
            .find_map(GeocodedAddress::display)
            .unwrap_or_else(|| coordinate.to_string());
        Ok(UserLocation::new(coordinate, address))
    }
}

/// Location source for hosts without positioning hardware: a configured
/// position, reverse geocoded through the Places service when available.
/// No configured position behaves like a denied permission.
pub struct FixedLocationProvider {
    position: Option<Coordinate>,
    places: Option<Arc<GooglePlacesClient>>,
}

impl FixedLocationProvider {
    pub fn new(position: Option<Coordinate>, places: Option<Arc<GooglePlacesClient>>) -> Self {
        Self { position, places }
    }
}

#[async_trait]
impl LocationProvider for FixedLocationProvider {
    async fn request_permission(&self) -> FinderResult<PermissionStatus> {
        Ok(match self.position {
            Some(_) => PermissionStatus::Granted,
            None => PermissionStatus::Denied,
        })
    }

    async fn current_position(&self) -> FinderResult<Coordinate> {
        match self.position {
            Some(position) if position.is_valid() => Ok(position),
            Some(position) => Err(FinderError::Position(format!(
                "configured position out of range: {}",
                position
            ))),
            None => Err(FinderError::PermissionDenied),
        }
    }

    async fn reverse_geocode(&self, coordinate: Coordinate) -> FinderResult<Vec<GeocodedAddress>> {
        match &self.places {
            Some(places) => places.reverse_geocode(coordinate).await,
            None => Ok(Vec::new()),
        }
    }
}
