use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{FinderError, FinderResult};
use crate::http::HttpClient;
use crate::location::GeocodedAddress;
use crate::models::{Coordinate, PlaceSuggestion};

const AUTOCOMPLETE_ENDPOINT: &str = "place/autocomplete";
const DETAILS_ENDPOINT: &str = "place/details";
const GEOCODE_ENDPOINT: &str = "geocode";

/// Inputs this short never reach the autocomplete service.
pub const MIN_AUTOCOMPLETE_CHARS: usize = 3;

pub fn is_searchable(input: &str) -> bool {
    input.chars().count() >= MIN_AUTOCOMPLETE_CHARS
}

/// Place autocomplete and lookup.
#[async_trait]
pub trait GeocodingService: Send + Sync {
    async fn autocomplete(&self, input: &str) -> FinderResult<Vec<PlaceSuggestion>>;
    async fn place_location(&self, place_id: &str) -> FinderResult<Coordinate>;
}

#[derive(Debug, Deserialize)]
struct AutocompleteResponse {
    #[serde(default)]
    predictions: Vec<PlaceSuggestion>,
    status: String,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct PlaceResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    result: Option<PlaceResult>,
    status: String,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AddressComponent {
    long_name: String,
    #[serde(default)]
    types: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    #[serde(default)]
    formatted_address: Option<String>,
    #[serde(default)]
    address_components: Vec<AddressComponent>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeResult>,
    status: String,
    #[serde(default)]
    error_message: Option<String>,
}

fn check_status(endpoint: &str, status: &str, message: Option<&str>) -> FinderResult<()> {
    match status {
        "OK" | "ZERO_RESULTS" => Ok(()),
        other => Err(FinderError::Network(format!(
            "{} returned {}{}",
            endpoint,
            other,
            message.map(|m| format!(": {}", m)).unwrap_or_default()
        ))),
    }
}

fn component(components: &[AddressComponent], wanted: &[&str]) -> Option<String> {
    components
        .iter()
        .find(|c| c.types.iter().any(|t| wanted.contains(&t.as_str())))
        .map(|c| c.long_name.clone())
}

impl From<GeocodeResult> for GeocodedAddress {
    fn from(result: GeocodeResult) -> Self {
        let components = &result.address_components;
        GeocodedAddress {
            name: component(
                components,
                &["point_of_interest", "premise", "route", "locality"],
            ),
            region: component(components, &["administrative_area_level_1"]),
            formatted: result.formatted_address,
        }
    }
}

/// Google Places compatible client.
pub struct GooglePlacesClient {
    http: HttpClient,
    base_url: String,
    api_key: String,
}

impl GooglePlacesClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            http: HttpClient::new(timeout),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}/json", self.base_url, endpoint)
    }

    pub async fn reverse_geocode(&self, coordinate: Coordinate) -> FinderResult<Vec<GeocodedAddress>> {
        let response: GeocodeResponse = self
            .http
            .get_json(
                GEOCODE_ENDPOINT,
                self.url(GEOCODE_ENDPOINT),
                vec![
                    (
                        "latlng",
                        format!("{},{}", coordinate.latitude, coordinate.longitude),
                    ),
                    ("key", self.api_key.clone()),
                ],
                None,
            )
            .await?;
        check_status(
            GEOCODE_ENDPOINT,
            &response.status,
            response.error_message.as_deref(),
        )?;

        Ok(response.results.into_iter().map(GeocodedAddress::from).collect())
    }
}

#[async_trait]
impl GeocodingService for GooglePlacesClient {
    async fn autocomplete(&self, input: &str) -> FinderResult<Vec<PlaceSuggestion>> {
        if !is_searchable(input) {
            return Ok(Vec::new());
        }

        debug!("Autocomplete lookup for {:?}", input);
        let response: AutocompleteResponse = self
            .http
            .get_json(
                AUTOCOMPLETE_ENDPOINT,
                self.url(AUTOCOMPLETE_ENDPOINT),
                vec![
                    ("input", input.to_string()),
                    ("key", self.api_key.clone()),
                    ("types", "mosque".to_string()),
                ],
                None,
            )
            .await?;
        check_status(
            AUTOCOMPLETE_ENDPOINT,
            &response.status,
            response.error_message.as_deref(),
        )?;

        Ok(response.predictions)
    }

    async fn place_location(&self, place_id: &str) -> FinderResult<Coordinate> {
        let response: DetailsResponse = self
            .http
            .get_json(
                DETAILS_ENDPOINT,
                self.url(DETAILS_ENDPOINT),
                vec![
                    ("place_id", place_id.to_string()),
                    ("fields", "geometry".to_string()),
                    ("key", self.api_key.clone()),
                ],
                None,
            )
            .await?;
        check_status(
            DETAILS_ENDPOINT,
            &response.status,
            response.error_message.as_deref(),
        )?;

        let location = response
            .result
            .map(|result| result.geometry.location)
            .ok_or_else(|| FinderError::Parse {
                endpoint: DETAILS_ENDPOINT.to_string(),
                message: format!("no geometry for place {}", place_id),
            })?;
        Ok(Coordinate::new(location.lat, location.lng))
    }
}
