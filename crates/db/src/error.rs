//! Typed error type for the db crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("row not found")]
    NotFound,

    /// A JSON column held something the caller can't decode.
    #[error("cannot decode column '{column}': {message}")]
    Decode { column: &'static str, message: String },

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}
