//! Execution record repository functions.
//!
//! Records are never hard-deleted; retention sets `deleted_at` and every
//! read filters soft-deleted rows out.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    models::{ExecutionRow, ExecutionUpdate},
    DbError,
};

const COLUMNS: &str = "id, sequence_id, customer_id, current_step, step_attempts, status, steps, \
     execution_data, started_at, completed_at, failed_at, failure_reason";

/// Insert a freshly created execution record.
pub async fn create_execution(pool: &PgPool, row: &ExecutionRow) -> Result<ExecutionRow, DbError> {
    let sql = format!(
        "INSERT INTO sequence_executions ({COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING {COLUMNS}"
    );
    let row = sqlx::query_as::<_, ExecutionRow>(&sql)
        .bind(row.id)
        .bind(row.sequence_id)
        .bind(row.customer_id)
        .bind(row.current_step)
        .bind(row.step_attempts)
        .bind(&row.status)
        .bind(&row.steps)
        .bind(&row.execution_data)
        .bind(row.started_at)
        .bind(row.completed_at)
        .bind(row.failed_at)
        .bind(&row.failure_reason)
        .fetch_one(pool)
        .await?;
    Ok(row)
}

/// Fetch one record, or `None` if it doesn't exist (or was soft-deleted).
pub async fn get_execution(pool: &PgPool, id: Uuid) -> Result<Option<ExecutionRow>, DbError> {
    let sql = format!("SELECT {COLUMNS} FROM sequence_executions WHERE id = $1 AND deleted_at IS NULL");
    let row = sqlx::query_as::<_, ExecutionRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// The active record for `(sequence_id, customer_id)`, if any.
pub async fn find_active(
    pool: &PgPool,
    sequence_id: Uuid,
    customer_id: Uuid,
) -> Result<Option<ExecutionRow>, DbError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM sequence_executions \
         WHERE sequence_id = $1 AND customer_id = $2 AND status = 'active' AND deleted_at IS NULL \
         LIMIT 1"
    );
    let row = sqlx::query_as::<_, ExecutionRow>(&sql)
        .bind(sequence_id)
        .bind(customer_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Compare-and-swap update guarded on `(id, current_step, step_attempts)`.
///
/// Only rows still `active` can change. Returns `None` when the guard did
/// not match, which means another invocation got there first.
pub async fn compare_and_swap(
    pool: &PgPool,
    id: Uuid,
    expected_step: i32,
    expected_attempts: i32,
    update: &ExecutionUpdate,
) -> Result<Option<ExecutionRow>, DbError> {
    let sql = format!(
        "UPDATE sequence_executions SET \
             current_step = $1, \
             step_attempts = $2, \
             status = $3, \
             execution_data = execution_data || $4::jsonb, \
             completed_at = COALESCE($5, completed_at), \
             failed_at = COALESCE($6, failed_at), \
             failure_reason = COALESCE($7, failure_reason) \
         WHERE id = $8 AND current_step = $9 AND step_attempts = $10 \
           AND status = 'active' AND deleted_at IS NULL \
         RETURNING {COLUMNS}"
    );
    let row = sqlx::query_as::<_, ExecutionRow>(&sql)
        .bind(update.current_step)
        .bind(update.step_attempts)
        .bind(&update.status)
        .bind(&update.append)
        .bind(update.completed_at)
        .bind(update.failed_at)
        .bind(&update.failure_reason)
        .bind(id)
        .bind(expected_step)
        .bind(expected_attempts)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// List records, optionally narrowed by sequence and status, newest first.
pub async fn list_executions(
    pool: &PgPool,
    sequence_id: Option<Uuid>,
    status: Option<&str>,
    limit: i64,
) -> Result<Vec<ExecutionRow>, DbError> {
    let mut qb = QueryBuilder::<Postgres>::new(format!(
        "SELECT {COLUMNS} FROM sequence_executions WHERE deleted_at IS NULL"
    ));
    if let Some(sequence_id) = sequence_id {
        qb.push(" AND sequence_id = ").push_bind(sequence_id);
    }
    if let Some(status) = status {
        qb.push(" AND status = ").push_bind(status.to_string());
    }
    qb.push(" ORDER BY started_at DESC LIMIT ").push_bind(limit);

    let rows = qb.build_query_as::<ExecutionRow>().fetch_all(pool).await?;
    Ok(rows)
}

/// Soft-delete finished records that started before `cutoff`.
///
/// Returns the number of rows affected.
pub async fn soft_delete_finished_before(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE sequence_executions SET deleted_at = $1 \
         WHERE status <> 'active' AND started_at < $2 AND deleted_at IS NULL",
    )
    .bind(Utc::now())
    .bind(cutoff)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
