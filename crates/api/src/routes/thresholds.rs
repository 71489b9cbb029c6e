//! Threshold Routes

use axum::{extract::State, Json};
use serde::Deserialize;
use storage::ThresholdConfig;

use crate::error::ApiError;
use crate::extract::CallerActor;
use crate::SharedState;

#[derive(Debug, Deserialize)]
pub struct ThresholdRequest {
    pub min: f64,
    pub max: f64,
}

pub async fn get_thresholds(
    State(state): State<SharedState>,
) -> Result<Json<ThresholdConfig>, ApiError> {
    Ok(Json(state.gateway.thresholds().get().await?))
}

/// Admin only
pub async fn put_thresholds(
    State(state): State<SharedState>,
    CallerActor(actor): CallerActor,
    Json(request): Json<ThresholdRequest>,
) -> Result<Json<ThresholdConfig>, ApiError> {
    let config = state
        .gateway
        .thresholds()
        .set(request.min, request.max, &actor)
        .await?;
    Ok(Json(config))
}
