//! Mosque list queries derived from filter state and the user's location.

pub mod cache;
pub mod coordinator;

pub use cache::{CachedList, QueryCache};
pub use coordinator::{MosqueQueryCoordinator, QueryOptions};

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

use crate::api_client::FilterMosquesRequest;
use crate::error::FinderError;
use crate::filter_store::FilterState;
use crate::models::{Coordinate, FacilityId, Mosque, RadiusMeters};

/// Cache identity of a mosque list request.
///
/// Facilities are sorted and deduplicated so selection order never produces
/// a distinct key. Coordinates compare by value.
#[derive(Debug, Clone)]
pub struct QueryKey {
    facilities: Vec<FacilityId>,
    coordinate: Coordinate,
    radius: RadiusMeters,
}

impl QueryKey {
    pub fn new(
        facilities: impl IntoIterator<Item = FacilityId>,
        coordinate: Coordinate,
        radius: RadiusMeters,
    ) -> Self {
        let mut facilities: Vec<FacilityId> = facilities.into_iter().collect();
        facilities.sort();
        facilities.dedup();

        Self {
            facilities,
            coordinate,
            radius,
        }
    }

    pub fn from_filters(filters: &FilterState, coordinate: Coordinate) -> Self {
        Self::new(
            filters.selected_facilities.iter().cloned(),
            coordinate,
            filters.radius_meters,
        )
    }

    pub fn facilities(&self) -> &[FacilityId] {
        &self.facilities
    }

    pub fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    pub fn radius(&self) -> RadiusMeters {
        self.radius
    }

    pub fn to_request(&self) -> FilterMosquesRequest {
        FilterMosquesRequest {
            current_lat: Some(self.coordinate.latitude),
            current_lng: Some(self.coordinate.longitude),
            distance: self.radius.get(),
            facilities: self.facilities.iter().map(|f| f.0.clone()).collect(),
        }
    }

    // -0.0 and 0.0 are the same position
    fn coordinate_bits(&self) -> (u64, u64) {
        (
            (self.coordinate.latitude + 0.0).to_bits(),
            (self.coordinate.longitude + 0.0).to_bits(),
        )
    }
}

impl PartialEq for QueryKey {
    fn eq(&self, other: &Self) -> bool {
        self.facilities == other.facilities
            && self.radius == other.radius
            && self.coordinate_bits() == other.coordinate_bits()
    }
}

impl Eq for QueryKey {}

impl Hash for QueryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.facilities.hash(state);
        self.coordinate_bits().hash(state);
        self.radius.hash(state);
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let facilities: Vec<&str> = self.facilities.iter().map(FacilityId::as_str).collect();
        write!(
            f,
            "mosques[{}]@{}~{}m",
            facilities.join(","),
            self.coordinate,
            self.radius.get()
        )
    }
}

/// What to do while no real position fix is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Hold the request while a fix is still expected; query the fallback
    /// coordinate only once permission is denied.
    #[default]
    Defer,
    /// Query the fallback coordinate right away.
    Query,
}

impl FromStr for FallbackPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "defer" => Ok(FallbackPolicy::Defer),
            "query" => Ok(FallbackPolicy::Query),
            other => Err(format!("unknown fallback policy: {}", other)),
        }
    }
}

/// Mosque list as presented to consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct MosqueQueryState {
    pub key: Option<QueryKey>,
    pub mosques: Option<Arc<Vec<Mosque>>>,
    pub loading: bool,
    pub error: Option<FinderError>,
    /// Keyed on the fallback coordinate rather than a real fix.
    pub degraded: bool,
    /// Where the map should be centred.
    pub center: Coordinate,
}

impl MosqueQueryState {
    pub fn idle(center: Coordinate) -> Self {
        Self {
            key: None,
            mosques: None,
            loading: false,
            error: None,
            degraded: true,
            center,
        }
    }
}

/// How a single query pass ended.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// A fresh cached list was published; no request was made.
    CacheHit,
    /// The response was published for the current key.
    Applied,
    /// The key changed while the request was in flight; the response was dropped.
    Discarded,
    /// No request was made because a position fix is still expected.
    Deferred,
    Failed(FinderError),
}
