//! Gateway-level error types.

use providers::ProviderError;
use thiserror::Error;

/// Errors raised while assembling a gateway. Sending never returns these:
/// delivery failure is reported in the `DeliveryReport`.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("provider '{name}' is configured twice")]
    DuplicateProvider { name: String },

    #[error("invalid rate limit ({per_second}/s, burst {burst})")]
    InvalidRateLimit { per_second: f64, burst: u32 },

    #[error("cannot build provider '{name}': {source}")]
    Provider {
        name: String,
        #[source]
        source: ProviderError,
    },
}

/// Errors from a delivery log store.
#[derive(Debug, Error)]
pub enum LogStoreError {
    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    /// A persisted row no longer decodes into a `DeliveryAttempt`.
    #[error("corrupt delivery log row {id}: {message}")]
    Corrupt { id: uuid::Uuid, message: String },
}
