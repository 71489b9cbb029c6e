//! Archive Routes

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use storage::ArchivedIncident;

use super::{ListMeta, MAX_LIMIT};
use crate::error::ApiError;
use crate::SharedState;

#[derive(Debug, Deserialize)]
pub struct ArchiveQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct ArchiveResponse {
    pub data: Vec<ArchivedIncident>,
    pub meta: ListMeta,
}

/// Newest-first archived incidents
pub async fn list_archives(
    State(state): State<SharedState>,
    Query(params): Query<ArchiveQuery>,
) -> Result<Json<ArchiveResponse>, ApiError> {
    let limit = params.limit.min(MAX_LIMIT);
    let data = state.gateway.store().archives(limit).await?;

    Ok(Json(ArchiveResponse {
        meta: ListMeta {
            count: data.len(),
            limit,
        },
        data,
    }))
}

pub async fn get_archive(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<ArchivedIncident>, ApiError> {
    state
        .gateway
        .store()
        .get_archive(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("archive"))
}
