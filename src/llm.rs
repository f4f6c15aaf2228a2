use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};

pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Turns a prompt into a completion.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, model: &str) -> Result<String>;
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    text: Option<String>,
}

/// Payload shapes seen from local model servers, probed in declaration order.
#[derive(Deserialize)]
#[serde(untagged)]
enum Completion {
    Response { response: String },
    Text { text: String },
    Choices { choices: Vec<Choice> },
}

/// Pulls the completion text out of a provider payload, falling back to the
/// serialized payload when no known shape matches.
pub fn extract_completion(payload: Value) -> String {
    match Completion::deserialize(&payload) {
        Ok(Completion::Response { response }) => response,
        Ok(Completion::Text { text }) => text,
        Ok(Completion::Choices { mut choices }) if !choices.is_empty() => {
            choices.swap_remove(0).text.unwrap_or_default()
        }
        _ => payload.to_string(),
    }
}

/// Client for an Ollama-style `/api/generate` endpoint.
pub struct OllamaClient {
    client: Client,
    url: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        OllamaClient {
            client,
            url: url.into(),
            timeout: GENERATION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Generator for OllamaClient {
    async fn generate(&self, prompt: &str, model: &str) -> Result<String> {
        let body = GenerateBody {
            model,
            prompt,
            stream: false,
        };

        tracing::debug!(url = %self.url, model, "calling generation service");
        let res = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let payload: Value = res
            .json()
            .await
            .map_err(|e| {
                AppError::UpstreamError(format!(
                    "Invalid response from generation service: {}",
                    e.without_url()
                ))
            })?;

        Ok(extract_completion(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefers_response_field() {
        let payload = json!({"model": "llama3", "response": "coffee", "text": "ignored", "done": true});
        assert_eq!(extract_completion(payload), "coffee");
    }

    #[test]
    fn falls_back_to_text_field() {
        assert_eq!(extract_completion(json!({"text": "tea"})), "tea");
    }

    #[test]
    fn reads_first_choice() {
        let payload = json!({"choices": [{"text": "first"}, {"text": "second"}]});
        assert_eq!(extract_completion(payload), "first");
    }

    #[test]
    fn choice_without_text_is_empty() {
        assert_eq!(extract_completion(json!({"choices": [{"index": 0}]})), "");
    }

    #[test]
    fn unknown_shape_serializes_payload() {
        let payload = json!({"output": "x"});
        assert_eq!(extract_completion(payload), r#"{"output":"x"}"#);
        assert_eq!(extract_completion(json!({"choices": []})), r#"{"choices":[]}"#);
        assert_eq!(extract_completion(json!("bare")), r#""bare""#);
    }
}
