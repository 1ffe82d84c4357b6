use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::error::{FinderError, FinderResult};

/// Blocking `ureq` agent driven from async code through the blocking pool.
///
/// Every request is bounded by the agent's global timeout; a timeout surfaces
/// as [`FinderError::Timeout`] like any other request failure.
#[derive(Clone)]
pub struct HttpClient {
    agent: ureq::Agent,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        Self { agent }
    }

    pub async fn get_json<T>(
        &self,
        endpoint: &str,
        url: String,
        query: Vec<(&'static str, String)>,
        bearer: Option<String>,
    ) -> FinderResult<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let agent = self.agent.clone();
        let endpoint = endpoint.to_string();

        run_blocking(endpoint.clone(), move || {
            let mut request = with_headers(agent.get(&url), bearer.as_deref());
            for (name, value) in &query {
                request = request.query(name, value);
            }
            let mut response = request
                .call()
                .map_err(|e| FinderError::from_ureq(&endpoint, e))?;
            response
                .body_mut()
                .read_json::<T>()
                .map_err(|e| FinderError::from_ureq(&endpoint, e))
        })
        .await
    }

    pub async fn post_json<B, T>(
        &self,
        endpoint: &str,
        url: String,
        body: &B,
        bearer: Option<String>,
    ) -> FinderResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Send + 'static,
    {
        let body = serde_json::to_value(body).map_err(|e| {
            FinderError::Validation(format!("unencodable body for {}: {}", endpoint, e))
        })?;
        let agent = self.agent.clone();
        let endpoint = endpoint.to_string();

        run_blocking(endpoint.clone(), move || {
            let mut response = with_headers(agent.post(&url), bearer.as_deref())
                .send_json(&body)
                .map_err(|e| FinderError::from_ureq(&endpoint, e))?;
            response
                .body_mut()
                .read_json::<T>()
                .map_err(|e| FinderError::from_ureq(&endpoint, e))
        })
        .await
    }
}

fn with_headers<B>(request: ureq::RequestBuilder<B>, bearer: Option<&str>) -> ureq::RequestBuilder<B> {
    let request = request.header("Accept", "application/json");
    match bearer {
        Some(token) => request.header("Authorization", format!("Bearer {}", token)),
        None => request,
    }
}

async fn run_blocking<T, F>(endpoint: String, call: F) -> FinderResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> FinderResult<T> + Send + 'static,
{
    let start = Instant::now();
    let result = tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| FinderError::Network(format!("{}: request task failed: {}", endpoint, e)))?;

    match &result {
        Ok(_) => debug!("{} completed in {:?}", endpoint, start.elapsed()),
        Err(e) => warn!("{} failed after {:?}: {}", endpoint, start.elapsed(), e),
    }
    result
}
