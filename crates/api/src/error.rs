use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use engine::{EngineError, StoreError};
use gateway::LogStoreError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    DeliveryLog(#[from] LogStoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Engine(err) => match err {
                EngineError::EmptyName | EngineError::NoSteps | EngineError::MalformedStep { .. } => {
                    StatusCode::BAD_REQUEST
                }
                EngineError::ExecutionNotFound(_)
                | EngineError::SequenceNotFound(_)
                | EngineError::CustomerNotFound(_) => StatusCode::NOT_FOUND,
                EngineError::SequenceDeactivated(_) | EngineError::TriggerMismatch { .. } => StatusCode::CONFLICT,
                EngineError::Store(StoreError::Duplicate { .. }) => StatusCode::CONFLICT,
                EngineError::Store(_) | EngineError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Store(StoreError::Duplicate { .. }) => StatusCode::CONFLICT,
            Self::Store(_) | Self::DeliveryLog(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
