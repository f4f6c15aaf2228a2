use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;

use crate::places::PlaceResult;

pub const DEFAULT_LIMIT: i64 = 5;

#[derive(Deserialize, Default)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Serialize)]
pub struct GenerateResponse {
    pub text: String,
}

#[derive(Deserialize, Default)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient_limit")]
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LimitValue {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Accepts `3`, `3.0` and `"3"`; fractional values truncate toward zero.
fn lenient_limit<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Option::<LimitValue>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(value) => value,
    };

    let limit = match value {
        LimitValue::Int(limit) => limit,
        LimitValue::Float(limit) if limit.is_finite() => limit.trunc() as i64,
        LimitValue::Float(limit) => {
            return Err(serde::de::Error::custom(format!("invalid limit: {}", limit)));
        }
        LimitValue::Text(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid limit: {:?}", raw)))?,
    };
    Ok(Some(limit))
}

impl SearchRequest {
    /// Requested result count, at least one.
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).max(1) as usize
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref().filter(|location| !location.trim().is_empty())
    }

    /// JSON-encodes the fields so delimiters inside them cannot collide.
    pub fn cache_key(&self) -> String {
        format!("places::{}", json!([self.query, self.location(), self.limit()]))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Cache,
    Api,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub source: ResultSource,
    pub results: Vec<PlaceResult>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub time: i64,
}
