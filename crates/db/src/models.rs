//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models: they carry no domain behaviour.
//! Domain types live in the `engine` and `gateway` crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// customers
// ---------------------------------------------------------------------------

/// A customer as the sequence engine sees it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CustomerRow {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub tags: Vec<String>,
    /// Free-form attributes usable as message placeholders.
    pub attributes: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// sequences
// ---------------------------------------------------------------------------

/// A persisted sequence definition row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SequenceRow {
    pub id: Uuid,
    pub name: String,
    pub trigger_type: String,
    /// JSON array of step definitions.
    pub steps: serde_json::Value,
    pub version: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// sequence_executions
// ---------------------------------------------------------------------------

/// A persisted execution record row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionRow {
    pub id: Uuid,
    pub sequence_id: Uuid,
    pub customer_id: Uuid,
    pub current_step: i32,
    pub step_attempts: i32,
    pub status: String,
    /// Steps snapshotted from the definition at creation time.
    pub steps: serde_json::Value,
    /// JSON array of per-step outcomes, append-only.
    pub execution_data: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

/// Column values written by a compare-and-swap update.
#[derive(Debug, Clone)]
pub struct ExecutionUpdate {
    pub current_step: i32,
    pub step_attempts: i32,
    pub status: String,
    /// Outcomes appended to `execution_data` (JSON array).
    pub append: serde_json::Value,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// delivery_attempts
// ---------------------------------------------------------------------------

/// One provider attempt for one send.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeliveryAttemptRow {
    pub id: Uuid,
    pub execution_id: Option<Uuid>,
    pub sequence_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub provider: String,
    pub channel: String,
    pub recipient: String,
    pub message: String,
    pub status: String,
    pub response_time_ms: i64,
    pub error_message: Option<String>,
    pub response_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Aggregated delivery counters for one provider.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProviderStatsRow {
    pub provider: String,
    pub total: i64,
    pub delivered: i64,
    pub failed: i64,
    pub avg_response_time_ms: Option<f64>,
}

// ---------------------------------------------------------------------------
// job_queue
// ---------------------------------------------------------------------------

/// Possible statuses for a queued job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    DeadLettered,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending      => write!(f, "pending"),
            Self::Processing   => write!(f, "processing"),
            Self::Completed    => write!(f, "completed"),
            Self::DeadLettered => write!(f, "dead_lettered"),
        }
    }
}

/// A job row fetched from the queue table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub payload: serde_json::Value,
    pub last_error: Option<String>,
    pub run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
