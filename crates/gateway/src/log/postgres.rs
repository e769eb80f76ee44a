//! Postgres-backed delivery log (`delivery_attempts` table).

use async_trait::async_trait;
use db::models::DeliveryAttemptRow;
use db::repository::delivery_attempts::{self as repo, AttemptQuery};
use db::DbPool;

use super::{rate, DeliveryLogFilter, DeliveryLogStore, DeliveryStats, ProviderStats};
use crate::attempt::{AttemptContext, DeliveryAttempt};
use crate::LogStoreError;

#[derive(Clone)]
pub struct PgDeliveryLog {
    pool: DbPool,
}

impl PgDeliveryLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn to_query(filter: &DeliveryLogFilter) -> AttemptQuery {
    AttemptQuery {
        provider: filter.provider.clone(),
        status: filter.status.map(|s| s.as_str().to_string()),
        channel: filter.channel.map(|c| c.as_str().to_string()),
        sequence_id: filter.campaign,
        execution_id: filter.execution_id,
        customer_id: filter.customer_id,
        from: filter.from,
        to: filter.to,
        limit: i64::from(filter.effective_limit()),
        offset: i64::from(filter.offset),
    }
}

fn to_row(a: &DeliveryAttempt) -> DeliveryAttemptRow {
    DeliveryAttemptRow {
        id: a.id,
        execution_id: a.context.execution_id,
        sequence_id: a.context.sequence_id,
        customer_id: a.context.customer_id,
        provider: a.provider.clone(),
        channel: a.channel.as_str().to_string(),
        recipient: a.recipient.clone(),
        message: a.message.clone(),
        status: a.status.as_str().to_string(),
        response_time_ms: i64::try_from(a.response_time_ms).unwrap_or(i64::MAX),
        error_message: a.error_message.clone(),
        response_data: a.provider_response.clone(),
        created_at: a.created_at,
    }
}

fn from_row(row: DeliveryAttemptRow) -> Result<DeliveryAttempt, LogStoreError> {
    let corrupt = |message: String| LogStoreError::Corrupt { id: row.id, message };
    let channel = row.channel.parse().map_err(corrupt)?;
    let status = row.status.parse().map_err(corrupt)?;
    Ok(DeliveryAttempt {
        id: row.id,
        context: AttemptContext {
            execution_id: row.execution_id,
            sequence_id: row.sequence_id,
            customer_id: row.customer_id,
        },
        provider: row.provider,
        channel,
        recipient: row.recipient,
        message: row.message,
        status,
        response_time_ms: u64::try_from(row.response_time_ms).unwrap_or(0),
        provider_response: row.response_data,
        error_message: row.error_message,
        created_at: row.created_at,
    })
}

#[async_trait]
impl DeliveryLogStore for PgDeliveryLog {
    async fn append(&self, attempt: &DeliveryAttempt) -> Result<(), LogStoreError> {
        repo::insert_attempt(&self.pool, &to_row(attempt)).await?;
        Ok(())
    }

    async fn query(&self, filter: &DeliveryLogFilter) -> Result<Vec<DeliveryAttempt>, LogStoreError> {
        repo::query_attempts(&self.pool, &to_query(filter))
            .await?
            .into_iter()
            .map(from_row)
            .collect()
    }

    async fn stats(&self, filter: &DeliveryLogFilter) -> Result<DeliveryStats, LogStoreError> {
        let rows = repo::provider_stats(&self.pool, &to_query(filter)).await?;
        let providers = rows
            .into_iter()
            .map(|r| {
                let total = u64::try_from(r.total).unwrap_or(0);
                let delivered = u64::try_from(r.delivered).unwrap_or(0);
                ProviderStats {
                    provider: r.provider,
                    total,
                    delivered,
                    failed: u64::try_from(r.failed).unwrap_or(0),
                    delivery_rate: rate(delivered, total),
                    avg_response_time_ms: r.avg_response_time_ms,
                }
            })
            .collect();
        Ok(DeliveryStats::from_providers(providers))
    }
}
