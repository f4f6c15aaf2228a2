use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use crate::error::{AppError, Result};
use crate::rate_limit::RateSpec;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434/api/generate";
pub const DEFAULT_PLACES_API_URL: &str = "https://maps.googleapis.com/maps/api/place/textsearch/json";
pub const DEFAULT_MODEL: &str = "llama3";

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub google_maps_api_key: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub places_api_url: String,
    pub default_rate_limit: RateSpec,
    pub llm_rate_limit: RateSpec,
    pub search_rate_limit: RateSpec,
    pub cache_ttl: Duration,
    pub query_refinement: bool,
}

impl Config {
    /// Defaults for everything but the provider key.
    pub fn new(google_maps_api_key: impl Into<String>) -> Self {
        Config {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            google_maps_api_key: google_maps_api_key.into(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            ollama_model: DEFAULT_MODEL.to_string(),
            places_api_url: DEFAULT_PLACES_API_URL.to_string(),
            default_rate_limit: RateSpec::per_minute(60),
            llm_rate_limit: RateSpec::per_minute(30),
            search_rate_limit: RateSpec::per_minute(100),
            cache_ttl: Duration::from_secs(300),
            query_refinement: true,
        }
    }

    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        let google_maps_api_key = env::var("GOOGLE_MAPS_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AppError::ConfigError("Missing GOOGLE_MAPS_API_KEY in env".to_string()))?;

        let mut config = Config::new(google_maps_api_key);

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT").unwrap_or_else(|_| "5000".to_string());
        let port = port.parse::<u16>().map_err(|e| AppError::ConfigError(format!("Invalid port: {}", e)))?;
        let ip = IpAddr::from_str(&host).map_err(|e| AppError::ConfigError(format!("Invalid host address: {}", e)))?;
        config.server_addr = SocketAddr::new(ip, port);

        if let Ok(url) = env::var("OLLAMA_URL") {
            config.ollama_url = url;
        }
        if let Ok(model) = env::var("OLLAMA_MODEL") {
            config.ollama_model = model;
        }
        if let Ok(url) = env::var("PLACES_API_URL") {
            config.places_api_url = url;
        }

        config.default_rate_limit = rate_spec_var("RATE_LIMIT", config.default_rate_limit)?;
        config.llm_rate_limit = rate_spec_var("LLM_RATE_LIMIT", config.llm_rate_limit)?;
        config.search_rate_limit = rate_spec_var("SEARCH_RATE_LIMIT", config.search_rate_limit)?;

        if let Ok(secs) = env::var("CACHE_TIMEOUT_SECS") {
            let secs = secs
                .trim()
                .parse::<u64>()
                .map_err(|e| AppError::ConfigError(format!("Invalid CACHE_TIMEOUT_SECS: {}", e)))?;
            config.cache_ttl = Duration::from_secs(secs);
        }

        if let Ok(flag) = env::var("QUERY_REFINEMENT") {
            config.query_refinement = parse_flag(&flag)
                .ok_or_else(|| AppError::ConfigError(format!("Invalid QUERY_REFINEMENT: {}", flag)))?;
        }

        Ok(config)
    }
}

fn rate_spec_var(name: &str, default: RateSpec) -> Result<RateSpec> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| AppError::ConfigError(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
