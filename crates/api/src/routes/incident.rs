//! Active Incident Routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use incident_core::{IncidentPatch, IncidentStatusView};
use serde::Deserialize;
use storage::{Comment, Incident, IncidentId};

use crate::error::ApiError;
use crate::extract::CallerActor;
use crate::SharedState;

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub content: String,
}

/// Active incident with the caller's permissions, or `{active: false}`
pub async fn get_incident(
    State(state): State<SharedState>,
    CallerActor(actor): CallerActor,
) -> Result<Json<IncidentStatusView>, ApiError> {
    let view = IncidentStatusView::query(state.gateway.store().as_ref(), &actor).await?;
    Ok(Json(view))
}

pub async fn patch_incident(
    State(state): State<SharedState>,
    Path(id): Path<IncidentId>,
    CallerActor(actor): CallerActor,
    Json(patch): Json<IncidentPatch>,
) -> Result<Json<Incident>, ApiError> {
    let incident = state.gateway.ledger().apply(id, &actor, patch).await?;
    Ok(Json(incident))
}

pub async fn post_comment(
    State(state): State<SharedState>,
    Path(id): Path<IncidentId>,
    CallerActor(actor): CallerActor,
    Json(request): Json<CommentRequest>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let comment = state
        .gateway
        .ledger()
        .add_comment(id, &actor, &request.content)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}
