//! Job queue repository functions.
//!
//! The queue is backed by the `job_queue` Postgres table. Workers poll for
//! due rows (`run_at <= now`) with `SELECT … FOR UPDATE SKIP LOCKED` so
//! several workers can share the table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::JobRow, DbError};

const COLUMNS: &str =
    "id, execution_id, status, attempts, max_attempts, payload, last_error, run_at, created_at, updated_at";

/// Enqueue a job that becomes due at `run_at`.
///
/// `payload` is the serialised task the worker hands back to the engine.
pub async fn enqueue_job(
    pool: &PgPool,
    execution_id: Uuid,
    payload: serde_json::Value,
    run_at: DateTime<Utc>,
    max_attempts: i32,
) -> Result<JobRow, DbError> {
    let sql = format!(
        "INSERT INTO job_queue (id, execution_id, status, attempts, max_attempts, payload, run_at, created_at, updated_at) \
         VALUES ($1, $2, 'pending', 0, $3, $4, $5, $6, $6) RETURNING {COLUMNS}"
    );
    let row = sqlx::query_as::<_, JobRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(execution_id)
        .bind(max_attempts)
        .bind(payload)
        .bind(run_at)
        .bind(Utc::now())
        .fetch_one(pool)
        .await?;
    Ok(row)
}

/// Atomically fetch the earliest due job and mark it as `processing`.
///
/// Returns `None` if nothing is due at `now`.
pub async fn fetch_next_due(pool: &PgPool, now: DateTime<Utc>) -> Result<Option<JobRow>, DbError> {
    let mut tx = pool.begin().await?;

    let sql = format!(
        "SELECT {COLUMNS} FROM job_queue \
         WHERE status = 'pending' AND run_at <= $1 \
         ORDER BY run_at ASC \
         LIMIT 1 \
         FOR UPDATE SKIP LOCKED"
    );
    let row = sqlx::query_as::<_, JobRow>(&sql)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

    let Some(mut job) = row else {
        tx.rollback().await?;
        return Ok(None);
    };

    sqlx::query(
        "UPDATE job_queue SET status = 'processing', attempts = attempts + 1, updated_at = $1 WHERE id = $2",
    )
    .bind(Utc::now())
    .bind(job.id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    job.status = "processing".into();
    job.attempts += 1;
    Ok(Some(job))
}

/// Mark a job as completed.
pub async fn complete_job(pool: &PgPool, job_id: Uuid) -> Result<(), DbError> {
    sqlx::query("UPDATE job_queue SET status = 'completed', updated_at = $1 WHERE id = $2")
        .bind(Utc::now())
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Return a failed job to `pending` at `retry_at`, or dead-letter it once
/// its own `max_attempts` is spent.
pub async fn fail_job(
    pool: &PgPool,
    job_id: Uuid,
    error: &str,
    retry_at: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE job_queue \
         SET status = CASE WHEN attempts >= max_attempts THEN 'dead_lettered' ELSE 'pending' END, \
             last_error = $1, \
             run_at = $2, \
             updated_at = $3 \
         WHERE id = $4",
    )
    .bind(error)
    .bind(retry_at)
    .bind(Utc::now())
    .bind(job_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Return `processing` jobs claimed before `stale_before` to `pending`.
///
/// A claim stamps `updated_at`; a worker that dies before settling leaves
/// the row behind with that stamp.
pub async fn reclaim_stale_jobs(pool: &PgPool, stale_before: DateTime<Utc>) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE job_queue SET status = 'pending', updated_at = $1 \
         WHERE status = 'processing' AND updated_at < $2",
    )
    .bind(Utc::now())
    .bind(stale_before)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Number of jobs currently `pending`.
pub async fn pending_count(pool: &PgPool) -> Result<i64, DbError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_queue WHERE status = 'pending'")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
