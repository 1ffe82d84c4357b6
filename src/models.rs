use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::num::NonZeroU32;

use crate::distance::distance_km;
use crate::error::{FinderError, FinderResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }

    pub fn distance_km_to(&self, other: &Coordinate) -> f64 {
        distance_km(
            self.latitude,
            self.longitude,
            other.latitude,
            other.longitude,
        )
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5}, {:.5}", self.latitude, self.longitude)
    }
}

/// A position fix together with its reverse-geocoded address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserLocation {
    pub coordinate: Coordinate,
    pub address: String,
}

impl UserLocation {
    pub fn new(coordinate: Coordinate, address: impl Into<String>) -> Self {
        Self {
            coordinate,
            address: address.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacilityId(pub String);

impl FacilityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FacilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FacilityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Search radius in meters. Zero is rejected when the value is constructed,
/// so a `RadiusMeters` that reaches the store or the backend is always valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct RadiusMeters(NonZeroU32);

impl RadiusMeters {
    pub const DEFAULT: RadiusMeters = match NonZeroU32::new(5000) {
        Some(radius) => RadiusMeters(radius),
        None => unreachable!(),
    };

    pub fn new(meters: u32) -> FinderResult<Self> {
        NonZeroU32::new(meters)
            .map(RadiusMeters)
            .ok_or_else(|| FinderError::Validation("radius must be greater than zero".into()))
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl Default for RadiusMeters {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for RadiusMeters {
    type Error = FinderError;

    fn try_from(meters: u32) -> Result<Self, Self::Error> {
        RadiusMeters::new(meters)
    }
}

impl From<RadiusMeters> for u32 {
    fn from(radius: RadiusMeters) -> Self {
        radius.get()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentSearch {
    pub id: String,
    pub name: String,
    pub location: String,
}

/// Facility as listed by the backend; `facilities` holds the display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MosqueFacility {
    pub id: String,
    pub facilities: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub alt: Option<String>,
}

/// An upload reference is either an unpopulated id or the media document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MediaRef {
    Id(String),
    Media(Media),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosqueImage {
    pub image: MediaRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MosqueStatus {
    Approved,
    Pending,
    Rejected,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mosque {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    /// `[longitude, latitude]`, GeoJSON order.
    pub position: [f64; 2],
    #[serde(default, deserialize_with = "deserialize_facility_ids")]
    pub facilities: BTreeSet<FacilityId>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub images: Vec<MosqueImage>,
    #[serde(default)]
    pub status: MosqueStatus,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Mosque {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.position[1], self.position[0])
    }

    pub fn offers(&self, facility: &FacilityId) -> bool {
        self.facilities.contains(facility)
    }

    /// Distance from the user, or `None` while no fix is available.
    pub fn distance_km_from(&self, user: Option<&UserLocation>) -> Option<f64> {
        user.map(|location| location.coordinate.distance_km_to(&self.coordinate()))
    }

    pub fn image_urls(&self, base_url: &str) -> Vec<String> {
        let base = base_url.trim_end_matches('/');
        self.images
            .iter()
            .filter_map(|image| match &image.image {
                MediaRef::Media(Media { url: Some(url), .. }) => {
                    Some(format!("{}/{}", base, url.trim_start_matches('/')))
                }
                _ => None,
            })
            .collect()
    }

    pub fn directions_url(&self) -> String {
        let coordinate = self.coordinate();
        format!(
            "https://www.google.com/maps/dir/?api=1&destination={},{}",
            coordinate.latitude, coordinate.longitude
        )
    }
}

/// Renders a distance for display, `"Unknown"` when there is no fix.
pub fn format_distance(distance_km: Option<f64>) -> String {
    match distance_km {
        Some(km) => format!("{:.2} km", km),
        None => "Unknown".to_string(),
    }
}

// The backend sends facilities either as bare ids or as populated documents.
#[derive(Deserialize)]
#[serde(untagged)]
enum FacilityRef {
    Id(String),
    Doc { id: String },
}

fn deserialize_facility_ids<'de, D>(deserializer: D) -> Result<BTreeSet<FacilityId>, D::Error>
where
    D: Deserializer<'de>,
{
    let refs: Option<Vec<FacilityRef>> = Option::deserialize(deserializer)?;
    Ok(refs
        .unwrap_or_default()
        .into_iter()
        .map(|facility| match facility {
            FacilityRef::Id(id) | FacilityRef::Doc { id } => FacilityId(id),
        })
        .collect())
}

fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredFormatting {
    pub main_text: String,
    #[serde(default)]
    pub secondary_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceSuggestion {
    pub place_id: String,
    pub description: String,
    pub structured_formatting: StructuredFormatting,
}

impl PlaceSuggestion {
    pub fn to_recent_search(&self) -> RecentSearch {
        RecentSearch {
            id: self.place_id.clone(),
            name: self.structured_formatting.main_text.clone(),
            location: self.structured_formatting.secondary_text.clone(),
        }
    }
}

/// Map re-center request emitted when a place is picked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapRegion {
    pub center: Coordinate,
    pub latitude_delta: f64,
    pub longitude_delta: f64,
}

impl MapRegion {
    pub fn around(center: Coordinate) -> Self {
        Self {
            center,
            latitude_delta: 0.01,
            longitude_delta: 0.01,
        }
    }
}
