use axum::{
    extract::{Query, State},
    Json,
};
use gateway::{DeliveryAttempt, DeliveryLogFilter, DeliveryStats};

use crate::{ApiError, AppState};

/// Newest first, paged by `limit` / `offset`.
pub async fn list(
    State(state): State<AppState>,
    Query(filter): Query<DeliveryLogFilter>,
) -> Result<Json<Vec<DeliveryAttempt>>, ApiError> {
    Ok(Json(state.delivery_log.query(&filter).await?))
}

pub async fn stats(
    State(state): State<AppState>,
    Query(filter): Query<DeliveryLogFilter>,
) -> Result<Json<DeliveryStats>, ApiError> {
    Ok(Json(state.delivery_log.stats(&filter).await?))
}
