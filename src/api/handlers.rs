//! HTTP handlers

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use std::sync::Arc;

use crate::api::types::{
    GenerationRequest, GenerationResponse, HealthResponse, ModelInfoResponse, RootResponse,
};
use crate::error::{AppError, Result};
use crate::gateway::GeneratedImages;
use crate::AppState;

pub const SERVICE_MESSAGE: &str = "DotCanvas AI Image Generation Service";

/// `GET /`
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: SERVICE_MESSAGE.to_string(),
    })
}

/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        model_loaded: state.models.is_ready(),
    })
}

/// `GET /model`
pub async fn model_info(State(state): State<Arc<AppState>>) -> Json<ModelInfoResponse> {
    Json(ModelInfoResponse {
        model: state.models.snapshot(),
        queue: state.queue.stats(),
    })
}

/// `POST /generate`
pub async fn generate(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Json<GenerationResponse>> {
    let Json(request) = payload.map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    let params = request.into_params(&state.settings.limits)?;

    let GeneratedImages { images, seed } = state.service.generate(params).await?;

    let image = images
        .first()
        .cloned()
        .ok_or_else(|| AppError::Inference("pipeline returned no images".to_string()))?;
    let images = (images.len() > 1).then_some(images);

    Ok(Json(GenerationResponse { image, seed, images }))
}
