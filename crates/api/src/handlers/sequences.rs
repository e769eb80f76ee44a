use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use engine::{validate_sequence, SequenceDefinition, StartSummary, StepDefinition, TriggerFilter, TriggerType};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateSequenceDto {
    pub name: String,
    pub trigger_type: TriggerType,
    pub steps: Vec<StepDefinition>,
}

#[derive(Debug, Deserialize)]
pub struct StartSequenceDto {
    #[serde(default = "manual")]
    pub trigger_type: TriggerType,
    #[serde(flatten)]
    pub filter: TriggerFilter,
}

fn manual() -> TriggerType {
    TriggerType::Manual
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateSequenceDto>,
) -> Result<(StatusCode, Json<SequenceDefinition>), ApiError> {
    validate_sequence(&payload.name, &payload.steps)?;

    let sequence = SequenceDefinition::new(payload.name.trim(), payload.trigger_type, payload.steps);
    state.stores.sequences.create_sequence(&sequence).await?;
    info!("created sequence '{}' ({}) with {} step(s)", sequence.name, sequence.id, sequence.steps.len());
    Ok((StatusCode::CREATED, Json(sequence)))
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<SequenceDefinition>>, ApiError> {
    Ok(Json(state.stores.sequences.list_sequences().await?))
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<SequenceDefinition>, ApiError> {
    state
        .stores
        .sequences
        .get_sequence(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("sequence {id}")))
}

/// In-flight executions fail on their next step.
pub async fn deactivate(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<SequenceDefinition>, ApiError> {
    if !state.stores.sequences.set_active(id, false).await? {
        return Err(ApiError::NotFound(format!("sequence {id}")));
    }
    info!("deactivated sequence {}", id);
    get(Path(id), State(state)).await
}

pub async fn start(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<StartSequenceDto>,
) -> Result<(StatusCode, Json<StartSummary>), ApiError> {
    let summary = state.triggers.start_sequence(id, payload.trigger_type, &payload.filter).await?;
    Ok((StatusCode::ACCEPTED, Json(summary)))
}
