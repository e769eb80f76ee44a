//! Postgres connection pool and embedded migrations.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::DbError;

/// Shared Postgres pool used by every store in the process.
pub type DbPool = PgPool;

/// Settings for [`create_pool`].
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub database_url: String,
    pub max_connections: u32,
    /// How long a caller waits for a free connection.
    pub acquire_timeout: Duration,
}

impl PoolSettings {
    pub fn new(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Open a pool and verify one connection works.
pub async fn create_pool(settings: &PoolSettings) -> Result<DbPool, DbError> {
    info!(
        "Connecting to database (max_connections={}, acquire_timeout={:?})",
        settings.max_connections, settings.acquire_timeout
    );
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.acquire_timeout)
        .connect(&settings.database_url)
        .await?;
    ping(&pool).await?;
    Ok(pool)
}

/// Round-trip a trivial query; used by readiness checks.
pub async fn ping(pool: &DbPool) -> Result<(), DbError> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the SQL files under the workspace `migrations/` directory.
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    info!("Applying schema migrations");
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}
