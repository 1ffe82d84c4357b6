use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthProvider;
use crate::error::{FinderError, FinderResult};
use crate::http::HttpClient;
use crate::models::{Coordinate, Mosque, MosqueFacility};

const FILTER_ENDPOINT: &str = "filterMosque";
const FACILITIES_ENDPOINT: &str = "get-facilities";
const MOSQUES_ENDPOINT: &str = "mosques";

/// Body of the mosque filter endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterMosquesRequest {
    pub current_lat: Option<f64>,
    pub current_lng: Option<f64>,
    /// Search radius in meters.
    pub distance: u32,
    pub facilities: Vec<String>,
}

impl FilterMosquesRequest {
    pub fn validate(&self) -> FinderResult<()> {
        if self.distance == 0 {
            return Err(FinderError::Validation(
                "distance must be greater than zero".into(),
            ));
        }
        match (self.current_lat, self.current_lng) {
            (Some(lat), Some(lng)) if !Coordinate::new(lat, lng).is_valid() => Err(
                FinderError::Validation(format!("coordinate out of range: {}, {}", lat, lng)),
            ),
            (Some(_), None) | (None, Some(_)) => Err(FinderError::Validation(
                "latitude and longitude must be sent together".into(),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Docs<T> {
    docs: Vec<T>,
}

/// Mosque data store consumed by the query coordinator.
#[async_trait]
pub trait MosqueBackend: Send + Sync {
    async fn filter_mosques(&self, request: &FilterMosquesRequest) -> FinderResult<Vec<Mosque>>;
    async fn list_facilities(&self) -> FinderResult<Vec<MosqueFacility>>;
    async fn get_mosque(&self, id: &str) -> FinderResult<Mosque>;
}

pub struct ApiClient {
    http: HttpClient,
    base_url: String,
    auth: Arc<dyn AuthProvider>,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration, auth: Arc<dyn AuthProvider>) -> Self {
        info!("Backend API at {} (timeout {:?})", base_url, timeout);
        Self {
            http: HttpClient::new(timeout),
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn bearer(&self) -> Option<String> {
        if self.auth.is_signed_in() {
            self.auth.get_token().await
        } else {
            None
        }
    }
}

#[async_trait]
impl MosqueBackend for ApiClient {
    async fn filter_mosques(&self, request: &FilterMosquesRequest) -> FinderResult<Vec<Mosque>> {
        request.validate()?;
        debug!(
            "Filtering mosques within {}m of {:?},{:?} with {:?}",
            request.distance, request.current_lat, request.current_lng, request.facilities
        );

        let bearer = self.bearer().await;
        self.http
            .post_json(FILTER_ENDPOINT, self.url(FILTER_ENDPOINT), request, bearer)
            .await
    }

    async fn list_facilities(&self) -> FinderResult<Vec<MosqueFacility>> {
        let bearer = self.bearer().await;
        let response: Docs<MosqueFacility> = self
            .http
            .get_json(
                FACILITIES_ENDPOINT,
                self.url(FACILITIES_ENDPOINT),
                Vec::new(),
                bearer,
            )
            .await?;
        Ok(response.docs)
    }

    async fn get_mosque(&self, id: &str) -> FinderResult<Mosque> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(FinderError::Validation(format!("invalid mosque id: {:?}", id)));
        }

        let path = format!("{}/{}", MOSQUES_ENDPOINT, id);
        let bearer = self.bearer().await;
        self.http
            .get_json(MOSQUES_ENDPOINT, self.url(&path), Vec::new(), bearer)
            .await
    }
}
