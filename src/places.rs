use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};

pub const PLACES_TIMEOUT: Duration = Duration::from_secs(15);

const EMBED_BASE: &str = "https://www.google.com/maps/embed/v1/place";
const DIRECTIONS_BASE: &str = "https://www.google.com/maps/dir/";

/// A normalized place as returned to callers and stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceResult {
    pub name: String,
    pub address: String,
    pub place_id: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub embed_src: Option<String>,
    pub directions_url: String,
}

#[async_trait]
pub trait PlacesProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        location: Option<&str>,
        limit: usize,
    ) -> Result<Vec<PlaceResult>>;
}

#[derive(Deserialize)]
struct TextSearchResponse {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct RawPlace {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    formatted_address: Option<String>,
    #[serde(default)]
    place_id: Option<String>,
    geometry: Geometry,
}

#[derive(Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

/// Builds the map links attached to every result.
#[derive(Clone)]
pub struct PlaceLinks {
    api_key: String,
    embed_base: Url,
    directions_base: Url,
}

impl PlaceLinks {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let parse = |raw: &str| {
            Url::parse(raw)
                .map_err(|e| AppError::ConfigError(format!("Invalid map link base {}: {}", raw, e)))
        };
        Ok(PlaceLinks {
            api_key: api_key.into(),
            embed_base: parse(EMBED_BASE)?,
            directions_base: parse(DIRECTIONS_BASE)?,
        })
    }

    pub fn embed_src(&self, place_id: &str) -> String {
        let mut url = self.embed_base.clone();
        url.query_pairs_mut()
            .append_pair("key", &self.api_key)
            .append_pair("q", &format!("place_id:{}", place_id));
        url.into()
    }

    pub fn directions_url(&self, lat: f64, lng: f64) -> String {
        let mut url = self.directions_base.clone();
        url.query_pairs_mut()
            .append_pair("api", "1")
            .append_pair("destination", &format!("{},{}", lat, lng))
            .append_pair("travelmode", "driving");
        url.into()
    }

    /// Projects one provider result; `None` when its geometry is unusable.
    pub fn shape(&self, raw: Value) -> Option<PlaceResult> {
        let raw: RawPlace = match serde_json::from_value(raw) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed place result");
                return None;
            }
        };

        let LatLng { lat, lng } = raw.geometry.location;
        let embed_src = raw.place_id.as_deref().map(|id| self.embed_src(id));

        Some(PlaceResult {
            name: raw.name.unwrap_or_default(),
            address: raw.formatted_address.unwrap_or_default(),
            place_id: raw.place_id,
            lat,
            lng,
            embed_src,
            directions_url: self.directions_url(lat, lng),
        })
    }
}

/// Query text sent upstream; location is folded into the text.
pub fn text_query(query: &str, location: Option<&str>) -> String {
    match location {
        Some(location) => format!("{} near {}", query, location),
        None => query.to_string(),
    }
}

/// Client for the Google Places text-search endpoint.
pub struct GooglePlacesClient {
    client: Client,
    url: String,
    links: PlaceLinks,
    timeout: Duration,
}

impl GooglePlacesClient {
    pub fn new(client: Client, url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Ok(GooglePlacesClient {
            client,
            url: url.into(),
            links: PlaceLinks::new(api_key)?,
            timeout: PLACES_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl PlacesProvider for GooglePlacesClient {
    async fn search(
        &self,
        query: &str,
        location: Option<&str>,
        limit: usize,
    ) -> Result<Vec<PlaceResult>> {
        let text = text_query(query, location);

        tracing::debug!(query = %text, limit, "calling places text search");
        let res = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .query(&[("query", text.as_str()), ("key", self.links.api_key.as_str())])
            .send()
            .await?
            .error_for_status()?;

        let body: TextSearchResponse = res
            .json()
            .await
            .map_err(|e| {
                AppError::UpstreamError(format!(
                    "Invalid response from places provider: {}",
                    e.without_url()
                ))
            })?;

        match body.status.as_deref() {
            None | Some("OK") | Some("ZERO_RESULTS") => {}
            Some(status) => {
                let detail = body.error_message.unwrap_or_default();
                return Err(AppError::UpstreamError(format!(
                    "Places provider returned {}: {}",
                    status, detail
                )));
            }
        }

        Ok(body
            .results
            .into_iter()
            .take(limit)
            .filter_map(|raw| self.links.shape(raw))
            .collect())
    }
}
