//! Read-only access to the host application's customer table.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{models::CustomerRow, DbError};

const COLUMNS: &str = "id, name, phone, email, tags, attributes, created_at, last_activity_at";

/// Criteria for [`find_customers`]; all present criteria must match.
#[derive(Debug, Clone, Default)]
pub struct CustomerQuery {
    pub ids: Option<Vec<Uuid>>,
    pub created_after: Option<DateTime<Utc>>,
    /// Customers whose last activity is older than this, or who never had any.
    pub inactive_since: Option<DateTime<Utc>>,
    /// Customers carrying *all* of these tags.
    pub tags: Vec<String>,
    pub limit: i64,
}

/// Fetch one customer by id.
pub async fn get_customer(pool: &PgPool, id: Uuid) -> Result<Option<CustomerRow>, DbError> {
    let sql = format!("SELECT {COLUMNS} FROM customers WHERE id = $1");
    let row = sqlx::query_as::<_, CustomerRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Customers matching `q`, oldest first.
pub async fn find_customers(pool: &PgPool, q: &CustomerQuery) -> Result<Vec<CustomerRow>, DbError> {
    let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM customers WHERE TRUE"));
    if let Some(ids) = &q.ids {
        qb.push(" AND id = ANY(").push_bind(ids.clone()).push(")");
    }
    if let Some(created_after) = q.created_after {
        qb.push(" AND created_at >= ").push_bind(created_after);
    }
    if let Some(inactive_since) = q.inactive_since {
        qb.push(" AND (last_activity_at IS NULL OR last_activity_at < ")
            .push_bind(inactive_since)
            .push(")");
    }
    if !q.tags.is_empty() {
        qb.push(" AND tags @> ").push_bind(q.tags.clone());
    }
    qb.push(" ORDER BY created_at ASC LIMIT ").push_bind(q.limit);

    let rows = qb.build_query_as::<CustomerRow>().fetch_all(pool).await?;
    Ok(rows)
}
