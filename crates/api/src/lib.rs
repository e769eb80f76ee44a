//! `api` crate — HTTP REST API layer.
//!
//! Exposes:
//!   POST   /api/v1/sequences
//!   GET    /api/v1/sequences
//!   GET    /api/v1/sequences/:id
//!   POST   /api/v1/sequences/:id/deactivate
//!   POST   /api/v1/sequences/:id/start
//!   GET    /api/v1/executions?sequence_id&status&limit
//!   GET    /api/v1/executions/:id
//!   GET    /api/v1/delivery-logs
//!   GET    /api/v1/delivery-logs/stats
//!   GET    /api/v1/providers/health
//!   POST   /api/v1/messages
//!   POST   /api/v1/messages/bulk

pub mod error;
pub mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use engine::{EngineStores, SequenceEngine, TriggerService};
use gateway::{DeliveryGateway, DeliveryLogStore};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

pub use error::ApiError;
use handlers::{delivery_logs, executions, messages, sequences};

/// Shared handles every handler can reach.
#[derive(Clone)]
pub struct AppState {
    pub stores: EngineStores,
    pub gateway: Arc<DeliveryGateway>,
    pub delivery_log: Arc<dyn DeliveryLogStore>,
    pub triggers: Arc<TriggerService>,
}

impl AppState {
    pub fn new(
        engine: Arc<SequenceEngine>,
        gateway: Arc<DeliveryGateway>,
        delivery_log: Arc<dyn DeliveryLogStore>,
    ) -> Self {
        Self {
            stores: engine.stores().clone(),
            gateway,
            delivery_log,
            triggers: Arc::new(TriggerService::new(engine)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/v1/sequences", post(sequences::create).get(sequences::list))
        .route("/api/v1/sequences/:id", get(sequences::get))
        .route("/api/v1/sequences/:id/deactivate", post(sequences::deactivate))
        .route("/api/v1/sequences/:id/start", post(sequences::start))
        .route("/api/v1/executions", get(executions::list))
        .route("/api/v1/executions/:id", get(executions::get))
        .route("/api/v1/delivery-logs", get(delivery_logs::list))
        .route("/api/v1/delivery-logs/stats", get(delivery_logs::stats))
        .route("/api/v1/providers/health", get(messages::health))
        .route("/api/v1/messages", post(messages::send))
        .route("/api/v1/messages/bulk", post(messages::bulk))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve<F>(addr: &str, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).with_graceful_shutdown(shutdown).await
}
