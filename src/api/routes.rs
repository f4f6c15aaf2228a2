use axum::{
    extract::{rejection::JsonRejection, Json, State},
    middleware,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::models::{
    GenerateRequest, GenerateResponse, HealthResponse, ResultSource, SearchRequest, SearchResponse,
};
use crate::error::{AppError, Result};
use crate::rate_limit;
use crate::{AppState, HEALTH_ROUTE, LLM_ROUTE, SEARCH_ROUTE};

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route(LLM_ROUTE, post(llm_handler))
        .route(SEARCH_ROUTE, post(search_handler))
        .route(HEALTH_ROUTE, get(health_handler))
        .layer(middleware::from_fn_with_state(app_state.clone(), rate_limit::enforce))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state)
}

fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|rejection| AppError::ValidationError(rejection.body_text()))
}

async fn llm_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>> {
    let req = body(payload)?;
    if req.prompt.trim().is_empty() {
        tracing::debug!("rejecting generation request without prompt");
        return Err(AppError::ValidationError("missing prompt".to_string()));
    }

    let model = req.model.as_deref().unwrap_or(&state.config.ollama_model);
    let start_time = std::time::Instant::now();

    match state.generator.generate(&req.prompt, model).await {
        Ok(text) => {
            tracing::info!(model, elapsed = ?start_time.elapsed(), "generation succeeded");
            Ok(Json(GenerateResponse { text }))
        }
        Err(err) => {
            tracing::error!(model, error = %err, "generation failed");
            Err(err)
        }
    }
}

async fn search_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>> {
    let req = body(payload)?;
    if req.query.trim().is_empty() {
        tracing::debug!("rejecting search request without query");
        return Err(AppError::ValidationError("missing query".to_string()));
    }

    let cache_key = req.cache_key();
    if let Some(results) = state.cache.get(&cache_key) {
        tracing::info!(key = %cache_key, "cache hit");
        return Ok(Json(SearchResponse {
            source: ResultSource::Cache,
            results,
        }));
    }
    tracing::info!(key = %cache_key, "cache miss");

    let query = state.refiner.refine(&req.query).await;
    let start_time = std::time::Instant::now();

    let results = match state.places.search(&query, req.location(), req.limit()).await {
        Ok(results) => results,
        Err(err) => {
            tracing::error!(%query, error = %err, "places search failed");
            return Err(err);
        }
    };
    tracing::info!(
        %query,
        count = results.len(),
        elapsed = ?start_time.elapsed(),
        "places search succeeded"
    );

    state.cache.set(cache_key, results.clone());

    Ok(Json(SearchResponse {
        source: ResultSource::Api,
        results,
    }))
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        time: Utc::now().timestamp(),
    })
}
