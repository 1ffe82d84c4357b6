use std::env;
use std::time::Duration;

use crate::models::Coordinate;
use crate::query::{FallbackPolicy, QueryOptions};

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_url: String,
    /// Prefix for relative mosque image paths.
    pub image_base_url: String,
    pub api_token: Option<String>,
    pub places_url: String,
    pub places_api_key: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub state_path: String,
    pub debounce: Duration,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub fallback: Coordinate,
    pub fallback_policy: FallbackPolicy,
    /// Position reported by the device location source, if any.
    pub device_position: Option<Coordinate>,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let api_url = env::var("MOSQUE_FINDER_API_URL")
            .unwrap_or_else(|_| "http://localhost:3000/api".to_string());
        let defaults = QueryOptions::default();

        Ok(Config {
            api: ApiConfig {
                image_base_url: env::var("MOSQUE_FINDER_IMAGE_BASE_URL")
                    .unwrap_or_else(|_| api_url.trim_end_matches("/api").to_string()),
                api_url,
                api_token: env::var("MOSQUE_FINDER_API_TOKEN")
                    .ok()
                    .filter(|t| !t.is_empty()),
                places_url: env::var("MOSQUE_FINDER_PLACES_URL")
                    .unwrap_or_else(|_| "https://maps.googleapis.com/maps/api".to_string()),
                places_api_key: env::var("MOSQUE_FINDER_PLACES_API_KEY").unwrap_or_default(),
                request_timeout: Duration::from_secs(
                    env::var("MOSQUE_FINDER_REQUEST_TIMEOUT_SECS")
                        .unwrap_or_else(|_| "30".to_string())
                        .parse()?,
                ),
            },
            state_path: env::var("MOSQUE_FINDER_STATE_PATH")
                .unwrap_or_else(|_| "./data/state".to_string()),
            debounce: Duration::from_millis(
                env::var("MOSQUE_FINDER_DEBOUNCE_MS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()?,
            ),
            cache_ttl: Duration::from_secs(
                env::var("MOSQUE_FINDER_CACHE_TTL_SECS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()?,
            ),
            cache_capacity: env::var("MOSQUE_FINDER_CACHE_CAPACITY")
                .unwrap_or_else(|_| "32".to_string())
                .parse()?,
            fallback: Coordinate::new(
                parse_or("MOSQUE_FINDER_FALLBACK_LAT", defaults.fallback.latitude)?,
                parse_or("MOSQUE_FINDER_FALLBACK_LNG", defaults.fallback.longitude)?,
            ),
            fallback_policy: env::var("MOSQUE_FINDER_FALLBACK_POLICY")
                .unwrap_or_else(|_| "defer".to_string())
                .parse()?,
            device_position: device_position()?,
        })
    }

    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            fallback: self.fallback,
            policy: self.fallback_policy,
            ttl: self.cache_ttl,
            cache_capacity: self.cache_capacity,
        }
    }
}

fn parse_or(name: &str, default: f64) -> Result<f64, Box<dyn std::error::Error>> {
    match env::var(name) {
        Ok(value) => Ok(value.trim().parse()?),
        Err(_) => Ok(default),
    }
}

fn device_position() -> Result<Option<Coordinate>, Box<dyn std::error::Error>> {
    match (
        env::var("MOSQUE_FINDER_DEVICE_LAT"),
        env::var("MOSQUE_FINDER_DEVICE_LNG"),
    ) {
        (Ok(lat), Ok(lng)) => {
            let position = Coordinate::new(lat.trim().parse()?, lng.trim().parse()?);
            if !position.is_valid() {
                return Err(format!("device position out of range: {}", position).into());
            }
            Ok(Some(position))
        }
        _ => Ok(None),
    }
}
