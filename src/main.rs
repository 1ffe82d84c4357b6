use anyhow::{anyhow, Context};
use log::{info, warn};
use std::sync::Arc;

use mosque_finder::api_client::{ApiClient, MosqueBackend};
use mosque_finder::auth::BearerToken;
use mosque_finder::config::Config;
use mosque_finder::facilities::FacilityCatalog;
use mosque_finder::filter_store::FilterStore;
use mosque_finder::location::{FixedLocationProvider, LocationSession};
use mosque_finder::models::{format_distance, UserLocation};
use mosque_finder::places::GooglePlacesClient;
use mosque_finder::query::{MosqueQueryCoordinator, MosqueQueryState, QueryOutcome};
use mosque_finder::storage::JsonFileStore;
use mosque_finder::suggestions::SuggestionCoordinator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = Config::from_env().map_err(|e| anyhow!("Invalid configuration: {}", e))?;
    let mut watch = false;
    let mut search_terms = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--watch" => watch = true,
            _ => search_terms.push(arg),
        }
    }

    info!("Starting mosque finder");
    info!("API: {}", config.api.api_url);
    info!("State path: {}", config.state_path);
    info!("Fallback policy: {:?}", config.fallback_policy);

    let storage = Arc::new(JsonFileStore::new(&config.state_path));
    let filters = Arc::new(FilterStore::load(storage).await);

    let auth = Arc::new(BearerToken::new(config.api.api_token.clone()));
    let backend = Arc::new(ApiClient::new(
        &config.api.api_url,
        config.api.request_timeout,
        auth,
    ));
    let places = Arc::new(GooglePlacesClient::new(
        &config.api.places_url,
        &config.api.places_api_key,
        config.api.request_timeout,
    ));

    let session = Arc::new(LocationSession::new(FixedLocationProvider::new(
        config.device_position,
        Some(places.clone()),
    )));
    let coordinator = Arc::new(MosqueQueryCoordinator::new(
        backend.clone(),
        filters.subscribe(),
        session.subscribe(),
        config.query_options(),
    ));
    let catalog = FacilityCatalog::new(backend.clone());

    match session.start().await {
        Ok(location) => info!("Located at {} ({})", location.address, location.coordinate),
        Err(e) => warn!("No position fix: {}", e),
    }

    if !search_terms.is_empty() {
        let suggestions = Arc::new(SuggestionCoordinator::new(
            places.clone(),
            filters.clone(),
            config.debounce,
        ));
        run_search(&suggestions, &search_terms.join(" ")).await?;
    }

    if let Err(e) = catalog.load().await {
        warn!("Facility names unavailable: {}", e);
    }

    match coordinator.refresh().await {
        QueryOutcome::Failed(e) => warn!("Mosque query failed: {}", e),
        QueryOutcome::Deferred => println!("Waiting for a position fix"),
        _ => {}
    }
    print_mosques(
        &coordinator.state(),
        session.current_location().as_ref(),
        &catalog,
        &config.api.image_base_url,
    );

    if watch {
        let handle = coordinator.spawn_watch();
        let mut updates = coordinator.subscribe();
        let current_location = session.clone();
        let base_url = config.api.image_base_url.clone();
        let printer = tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let state = updates.borrow_and_update().clone();
                if !state.loading {
                    print_mosques(
                        &state,
                        current_location.current_location().as_ref(),
                        &catalog,
                        &base_url,
                    );
                }
            }
        });

        info!("Watching for changes, press Ctrl-C to stop");
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        handle.abort();
        printer.abort();
    }

    filters
        .flush()
        .await
        .context("Failed to save filter state")?;
    Ok(())
}

async fn run_search<G>(suggestions: &Arc<SuggestionCoordinator<G>>, text: &str) -> anyhow::Result<()>
where
    G: mosque_finder::places::GeocodingService + 'static,
{
    if let Some(lookup) = suggestions.on_search_text_changed(text).await {
        lookup.await.context("Suggestion lookup panicked")?;
    }

    let state = suggestions.state();
    if let Some(e) = &state.error {
        warn!("Place search failed: {}", e);
    }
    let Some(first) = state.suggestions.first() else {
        println!("No places match {:?}", text);
        return Ok(());
    };

    for suggestion in &state.suggestions {
        println!("  {}", suggestion.description);
    }
    match suggestions.select(first).await {
        Ok(region) => println!("Map centred on {}", region.center),
        Err(e) => warn!("Could not resolve {}: {}", first.description, e),
    }
    Ok(())
}

fn print_mosques<B: MosqueBackend>(
    state: &MosqueQueryState,
    location: Option<&UserLocation>,
    catalog: &FacilityCatalog<B>,
    image_base_url: &str,
) {
    if let Some(e) = &state.error {
        println!("Showing last results, refresh failed: {}", e);
    }
    let Some(mosques) = &state.mosques else {
        return;
    };
    if state.degraded {
        println!("Searching around {} (no position fix)", state.center);
    }

    println!("{} mosques", mosques.len());
    for mosque in mosques.iter() {
        println!(
            "- {} ({}) {}",
            mosque.name,
            format_distance(mosque.distance_km_from(location)),
            mosque.address
        );

        let facilities: Vec<String> = mosque
            .facilities
            .iter()
            .map(|id| catalog.label(id).unwrap_or_else(|| id.to_string()))
            .collect();
        if !facilities.is_empty() {
            println!("    facilities: {}", facilities.join(", "));
        }
        if let Some(image) = mosque.image_urls(image_base_url).first() {
            println!("    image: {}", image);
        }
        println!("    directions: {}", mosque.directions_url());
    }
}
