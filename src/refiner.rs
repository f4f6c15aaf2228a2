use std::sync::Arc;

use crate::llm::Generator;

const MIN_REFINED_CHARS: usize = 3;
const MAX_REFINED_CHARS: usize = 200;

pub fn build_prompt(query: &str) -> String {
    format!(
        "Normalize this user search to a concise Google Places query: \"{}\". Output short phrase only.",
        query
    )
}

/// Accepts a model rewrite only if its trimmed length is within 3..=200 chars.
pub fn accept(candidate: &str) -> Option<&str> {
    let trimmed = candidate.trim();
    let len = trimmed.chars().count();
    (MIN_REFINED_CHARS..=MAX_REFINED_CHARS)
        .contains(&len)
        .then_some(trimmed)
}

/// Rewrites free-text searches into short place queries via the generator.
/// Never fails: any problem yields the original query.
#[derive(Clone)]
pub struct QueryRefiner {
    generator: Arc<dyn Generator>,
    model: String,
    enabled: bool,
}

impl QueryRefiner {
    pub fn new(generator: Arc<dyn Generator>, model: impl Into<String>) -> Self {
        QueryRefiner {
            generator,
            model: model.into(),
            enabled: true,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub async fn refine(&self, original: &str) -> String {
        if !self.enabled {
            return original.to_string();
        }

        let refined = match self.generator.generate(&build_prompt(original), &self.model).await {
            Ok(refined) => refined,
            Err(e) => {
                tracing::warn!(error = %e, "query refinement failed, using original query");
                return original.to_string();
            }
        };

        match accept(&refined) {
            Some(refined) => {
                tracing::info!(original, refined, "refined search query");
                refined.to_string()
            }
            None => {
                tracing::warn!(
                    len = refined.trim().chars().count(),
                    "refined query rejected, using original query"
                );
                original.to_string()
            }
        }
    }
}
