use axum::{
    extract::{Path, Query, State},
    Json,
};
use engine::{ExecutionFilter, ExecutionRecord, ExecutionStatus};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiError, AppState};

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

#[derive(Debug, Default, Deserialize)]
pub struct ListExecutionsQuery {
    pub sequence_id: Option<Uuid>,
    pub status: Option<ExecutionStatus>,
    pub limit: Option<usize>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListExecutionsQuery>,
) -> Result<Json<Vec<ExecutionRecord>>, ApiError> {
    let filter = ExecutionFilter {
        sequence_id: query.sequence_id,
        status: query.status,
        limit: query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
    };
    Ok(Json(state.stores.executions.list_executions(&filter).await?))
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<ExecutionRecord>, ApiError> {
    state
        .stores
        .executions
        .get_execution(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("execution {id}")))
}
