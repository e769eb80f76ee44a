//! Delivery attempt log: append and filtered reads.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    models::{DeliveryAttemptRow, ProviderStatsRow},
    DbError,
};

const COLUMNS: &str = "id, execution_id, sequence_id, customer_id, provider, channel, recipient, \
     message, status, response_time_ms, error_message, response_data, created_at";

/// Filter for [`query_attempts`] and [`provider_stats`]. `None` means "any".
#[derive(Debug, Clone, Default)]
pub struct AttemptQuery {
    pub provider: Option<String>,
    pub status: Option<String>,
    pub channel: Option<String>,
    pub sequence_id: Option<Uuid>,
    pub execution_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

/// Append one attempt row.
pub async fn insert_attempt(pool: &PgPool, row: &DeliveryAttemptRow) -> Result<(), DbError> {
    let sql = format!(
        "INSERT INTO delivery_attempts ({COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
    );
    sqlx::query(&sql)
        .bind(row.id)
        .bind(row.execution_id)
        .bind(row.sequence_id)
        .bind(row.customer_id)
        .bind(&row.provider)
        .bind(&row.channel)
        .bind(&row.recipient)
        .bind(&row.message)
        .bind(&row.status)
        .bind(row.response_time_ms)
        .bind(&row.error_message)
        .bind(&row.response_data)
        .bind(row.created_at)
        .execute(pool)
        .await?;
    Ok(())
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, q: &AttemptQuery) {
    qb.push(" WHERE TRUE");
    if let Some(provider) = &q.provider {
        qb.push(" AND provider = ").push_bind(provider.clone());
    }
    if let Some(status) = &q.status {
        qb.push(" AND status = ").push_bind(status.clone());
    }
    if let Some(channel) = &q.channel {
        qb.push(" AND channel = ").push_bind(channel.clone());
    }
    if let Some(sequence_id) = q.sequence_id {
        qb.push(" AND sequence_id = ").push_bind(sequence_id);
    }
    if let Some(execution_id) = q.execution_id {
        qb.push(" AND execution_id = ").push_bind(execution_id);
    }
    if let Some(customer_id) = q.customer_id {
        qb.push(" AND customer_id = ").push_bind(customer_id);
    }
    if let Some(from) = q.from {
        qb.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = q.to {
        qb.push(" AND created_at < ").push_bind(to);
    }
}

/// Attempts matching `q`, newest first.
pub async fn query_attempts(pool: &PgPool, q: &AttemptQuery) -> Result<Vec<DeliveryAttemptRow>, DbError> {
    let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM delivery_attempts"));
    push_filters(&mut qb, q);
    qb.push(" ORDER BY created_at DESC, id LIMIT ")
        .push_bind(q.limit)
        .push(" OFFSET ")
        .push_bind(q.offset);

    let rows = qb.build_query_as::<DeliveryAttemptRow>().fetch_all(pool).await?;
    Ok(rows)
}

/// Per-provider counters over the attempts matching `q` (limit/offset ignored).
pub async fn provider_stats(pool: &PgPool, q: &AttemptQuery) -> Result<Vec<ProviderStatsRow>, DbError> {
    let mut qb = QueryBuilder::<Postgres>::new(
        "SELECT provider, \
                COUNT(*) AS total, \
                COUNT(*) FILTER (WHERE status = 'delivered') AS delivered, \
                COUNT(*) FILTER (WHERE status = 'failed') AS failed, \
                AVG(response_time_ms)::float8 AS avg_response_time_ms \
         FROM delivery_attempts",
    );
    push_filters(&mut qb, q);
    qb.push(" GROUP BY provider ORDER BY provider");

    let rows = qb.build_query_as::<ProviderStatsRow>().fetch_all(pool).await?;
    Ok(rows)
}
