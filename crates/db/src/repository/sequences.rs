//! Sequence definition CRUD.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::SequenceRow, DbError};

const COLUMNS: &str = "id, name, trigger_type, steps, version, active, created_at";

/// Insert a new sequence definition.
///
/// `steps` must be the JSON produced by serialising the engine's step list.
pub async fn create_sequence(pool: &PgPool, row: &SequenceRow) -> Result<SequenceRow, DbError> {
    let sql = format!(
        "INSERT INTO sequences ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {COLUMNS}"
    );
    let row = sqlx::query_as::<_, SequenceRow>(&sql)
        .bind(row.id)
        .bind(&row.name)
        .bind(&row.trigger_type)
        .bind(&row.steps)
        .bind(row.version)
        .bind(row.active)
        .bind(row.created_at)
        .fetch_one(pool)
        .await?;
    Ok(row)
}

/// Fetch a single sequence by its primary key.
pub async fn get_sequence(pool: &PgPool, id: Uuid) -> Result<SequenceRow, DbError> {
    let sql = format!("SELECT {COLUMNS} FROM sequences WHERE id = $1");
    sqlx::query_as::<_, SequenceRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Return all sequences, newest first.
pub async fn list_sequences(pool: &PgPool) -> Result<Vec<SequenceRow>, DbError> {
    let sql = format!("SELECT {COLUMNS} FROM sequences ORDER BY created_at DESC");
    let rows = sqlx::query_as::<_, SequenceRow>(&sql).fetch_all(pool).await?;
    Ok(rows)
}

/// Flip the `active` flag. Returns `DbError::NotFound` if no row matched.
pub async fn set_active(pool: &PgPool, id: Uuid, active: bool) -> Result<(), DbError> {
    let result = sqlx::query("UPDATE sequences SET active = $1 WHERE id = $2")
        .bind(active)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
