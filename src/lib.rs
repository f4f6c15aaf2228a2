pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod llm;
pub mod places;
pub mod rate_limit;
pub mod refiner;

use std::sync::Arc;
use std::time::{Duration, Instant};

use cache::ResponseCache;
use config::Config;
use error::{AppError, Result};
use llm::{Generator, OllamaClient};
use places::{GooglePlacesClient, PlaceResult, PlacesProvider};
use rate_limit::RateLimiter;
use refiner::QueryRefiner;

pub const LLM_ROUTE: &str = "/api/llm";
pub const SEARCH_ROUTE: &str = "/api/search";
pub const HEALTH_ROUTE: &str = "/health";

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub generator: Arc<dyn Generator>,
    pub places: Arc<dyn PlacesProvider>,
    pub refiner: QueryRefiner,
    pub cache: Arc<ResponseCache<Vec<PlaceResult>>>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Wires the given upstream clients to fresh cache and limiter stores.
    pub fn new(
        config: Config,
        generator: Arc<dyn Generator>,
        places: Arc<dyn PlacesProvider>,
    ) -> Self {
        let refiner = QueryRefiner::new(generator.clone(), config.ollama_model.clone())
            .enabled(config.query_refinement);
        let limiter = RateLimiter::new(config.default_rate_limit)
            .with_route_limit(LLM_ROUTE, config.llm_rate_limit)
            .with_route_limit(SEARCH_ROUTE, config.search_rate_limit);

        AppState {
            cache: Arc::new(ResponseCache::new(config.cache_ttl)),
            limiter: Arc::new(limiter),
            config: Arc::new(config),
            generator,
            places,
            refiner,
        }
    }

    /// Builds the production clients over one pooled HTTP client.
    pub fn from_config(config: Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        let generator = OllamaClient::new(client.clone(), config.ollama_url.clone());
        let places = GooglePlacesClient::new(
            client,
            config.places_api_url.clone(),
            config.google_maps_api_key.clone(),
        )?;

        Ok(AppState::new(config, Arc::new(generator), Arc::new(places)))
    }

    /// Drops expired cache entries and rolled-over rate windows.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        let entries = self.cache.purge_expired(now);
        let windows = self.limiter.purge_expired(now);
        if entries > 0 || windows > 0 {
            tracing::debug!(entries, windows, "purged expired state");
        }
    }
}
