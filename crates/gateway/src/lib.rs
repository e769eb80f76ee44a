//! `gateway` crate — multi-provider delivery with failover and the
//! delivery log every attempt lands in.

pub mod attempt;
pub mod error;
pub mod gateway;
pub mod log;
pub mod rate_limit;
pub mod sink;

pub use attempt::{AttemptContext, AttemptStatus, DeliveryAttempt};
pub use error::{GatewayError, LogStoreError};
pub use gateway::{
    BulkOutcome, BulkResult, BulkSummary, DeliveryGateway, DeliveryReport, DeliveryRequest, GatewayBuilder,
    GatewayConfig, ProviderHealth,
};
pub use log::{DeliveryLogFilter, DeliveryLogStore, DeliveryStats, InMemoryDeliveryLog, PgDeliveryLog, ProviderStats};
pub use sink::{MetricsSink, NoopSink, RecordingSink, TracingSink};
