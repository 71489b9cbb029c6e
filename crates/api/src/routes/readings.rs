//! Reading Routes

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use incident_core::TransitionKind;
use serde::{Deserialize, Serialize};
use storage::{Incident, Reading, ReadingId};

use super::{ListMeta, MAX_LIMIT};
use crate::error::ApiError;
use crate::SharedState;

/// Reading posted by a sensor or gateway
#[derive(Debug, Deserialize)]
pub struct ReadingRequest {
    #[serde(alias = "temp")]
    pub temperature: Option<f64>,
    #[serde(alias = "hum")]
    pub humidity: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub reading_id: ReadingId,
    pub transition: TransitionKind,
    pub incident: Option<Incident>,
}

/// Query parameters for the readings list
#[derive(Debug, Deserialize)]
pub struct ReadingQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

#[derive(Debug, Serialize)]
pub struct ReadingResponse {
    pub data: Vec<Reading>,
    pub meta: ListMeta,
}

/// Ingest one reading
pub async fn post_reading(
    State(state): State<SharedState>,
    Json(request): Json<ReadingRequest>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let receipt = state
        .gateway
        .ingest(request.temperature, request.humidity)
        .await?;

    // Dispatch keeps running on its own task
    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            reading_id: receipt.reading.id,
            transition: receipt.transition.kind(),
            incident: receipt.transition.incident().cloned(),
        }),
    ))
}

/// Newest-first readings
pub async fn list_readings(
    State(state): State<SharedState>,
    Query(params): Query<ReadingQuery>,
) -> Result<Json<ReadingResponse>, ApiError> {
    let limit = params.limit.min(MAX_LIMIT);
    let data = state.gateway.store().recent_readings(limit).await?;

    Ok(Json(ReadingResponse {
        meta: ListMeta {
            count: data.len(),
            limit,
        },
        data,
    }))
}

pub async fn latest_reading(State(state): State<SharedState>) -> Result<Json<Reading>, ApiError> {
    state
        .gateway
        .store()
        .latest_reading()
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("reading"))
}
