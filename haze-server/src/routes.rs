use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Json, State};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::debug;

use crate::error::ApiError;
use crate::generate::run_generation;
use crate::schema::{
    GenerateRequest, GenerateResponse, HealthResponse, OpenAiImageData, OpenAiImageRequest,
    OpenAiImageResponse,
};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/generate", post(generate))
        .route("/v1/images/generations", post(openai_generate))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Reports liveness and the configured model; never touches the pipeline.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model: state.config.model_id.clone(),
    })
}

async fn generate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let request = req.normalize(state.config.max_edge)?;
    Ok(Json(run_generation(&state, request).await?))
}

async fn openai_generate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OpenAiImageRequest>,
) -> Result<Json<OpenAiImageResponse>, ApiError> {
    if let Some(model) = &req.model {
        // Accepted for compatibility only.
        debug!(%model, "ignoring model field on the compatible surface");
    }

    let request = req
        .into_native(state.config.max_edge)?
        .normalize(state.config.max_edge)?;
    let result = run_generation(&state, request).await?;

    let created = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();
    Ok(Json(OpenAiImageResponse {
        created,
        data: vec![OpenAiImageData {
            b64_json: result.image_base64,
        }],
    }))
}
