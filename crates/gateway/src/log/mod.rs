//! Delivery Log Store: append-only record of provider attempts plus the
//! filtered read surface reporting code consumes.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use providers::Channel;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attempt::{AttemptStatus, DeliveryAttempt};
use crate::LogStoreError;

pub use memory::InMemoryDeliveryLog;
pub use postgres::PgDeliveryLog;

/// Default page size for [`DeliveryLogFilter`].
pub const DEFAULT_LIMIT: u32 = 100;
/// Hard cap on the page size.
pub const MAX_LIMIT: u32 = 1000;

/// Read filter. Every present field must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryLogFilter {
    pub provider: Option<String>,
    pub status: Option<AttemptStatus>,
    pub channel: Option<Channel>,
    /// Sequence id the attempt was made for.
    pub campaign: Option<Uuid>,
    pub execution_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    /// Inclusive lower bound on `created_at`.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: u32,
}

impl DeliveryLogFilter {
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn matches(&self, a: &DeliveryAttempt) -> bool {
        self.provider.as_ref().map_or(true, |p| *p == a.provider)
            && self.status.map_or(true, |s| s == a.status)
            && self.channel.map_or(true, |c| c == a.channel)
            && self.campaign.map_or(true, |id| a.context.sequence_id == Some(id))
            && self.execution_id.map_or(true, |id| a.context.execution_id == Some(id))
            && self.customer_id.map_or(true, |id| a.context.customer_id == Some(id))
            && self.from.map_or(true, |from| a.created_at >= from)
            && self.to.map_or(true, |to| a.created_at < to)
    }
}

/// Counters for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderStats {
    pub provider: String,
    pub total: u64,
    pub delivered: u64,
    pub failed: u64,
    pub delivery_rate: f64,
    pub avg_response_time_ms: Option<f64>,
}

/// Aggregate counters over a filtered slice of the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryStats {
    pub total: u64,
    pub delivered: u64,
    pub failed: u64,
    pub delivery_rate: f64,
    pub providers: Vec<ProviderStats>,
}

pub(crate) fn rate(delivered: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        delivered as f64 / total as f64
    }
}

impl DeliveryStats {
    pub fn from_providers(providers: Vec<ProviderStats>) -> Self {
        let total = providers.iter().map(|p| p.total).sum();
        let delivered = providers.iter().map(|p| p.delivered).sum();
        let failed = providers.iter().map(|p| p.failed).sum();
        Self {
            total,
            delivered,
            failed,
            delivery_rate: rate(delivered, total),
            providers,
        }
    }
}

/// Storage contract for delivery attempts.
#[async_trait]
pub trait DeliveryLogStore: Send + Sync {
    /// Persist one attempt. Called once per provider tried.
    async fn append(&self, attempt: &DeliveryAttempt) -> Result<(), LogStoreError>;

    /// Attempts matching `filter`, newest first, paged.
    async fn query(&self, filter: &DeliveryLogFilter) -> Result<Vec<DeliveryAttempt>, LogStoreError>;

    /// Counters over everything matching `filter` (paging ignored).
    async fn stats(&self, filter: &DeliveryLogFilter) -> Result<DeliveryStats, LogStoreError>;
}
