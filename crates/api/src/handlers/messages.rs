//! Ad hoc sends that bypass sequences, plus provider health.

use axum::{extract::State, http::StatusCode, Json};
use gateway::{BulkSummary, DeliveryReport, DeliveryRequest, ProviderHealth};
use providers::{Channel, TemplateRef};
use serde::Deserialize;

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct SendMessageDto {
    pub channel: Channel,
    pub recipient: String,
    pub message: String,
    #[serde(default)]
    pub template: Option<TemplateRef>,
}

#[derive(Debug, Deserialize)]
pub struct BulkSendDto {
    pub channel: Channel,
    pub recipients: Vec<String>,
    pub message: String,
    #[serde(default)]
    pub template: Option<TemplateRef>,
}

/// `200` when a provider accepted, `400` when the gateway refused the
/// request outright, `502` when every provider failed.
pub async fn send(
    State(state): State<AppState>,
    Json(payload): Json<SendMessageDto>,
) -> (StatusCode, Json<DeliveryReport>) {
    let mut request = DeliveryRequest::new(payload.channel, payload.recipient, payload.message);
    request.template = payload.template;

    let report = state.gateway.send(&request).await;
    let status = if report.success {
        StatusCode::OK
    } else if report.rejected.is_some() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::BAD_GATEWAY
    };
    (status, Json(report))
}

pub async fn bulk(
    State(state): State<AppState>,
    Json(payload): Json<BulkSendDto>,
) -> Result<Json<BulkSummary>, ApiError> {
    if payload.recipients.is_empty() {
        return Err(ApiError::BadRequest("recipients must not be empty".into()));
    }
    let summary = state
        .gateway
        .bulk_send(&payload.recipients, &payload.message, payload.channel, payload.template)
        .await;
    Ok(Json(summary))
}

pub async fn health(State(state): State<AppState>) -> Json<Vec<ProviderHealth>> {
    Json(state.gateway.provider_health().await)
}
