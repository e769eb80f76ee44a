//! `queue` crate — delayed task scheduling for the sequence engine.
//!
//! Two seams:
//! - [`Scheduler`]: what the engine uses to ask for "advance execution X at
//!   time T".
//! - [`JobSource`]: what the worker uses to claim due work and report back.
//!
//! Delivery is at-least-once. Consumers must tolerate duplicates.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod task;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use error::QueueError;
pub use memory::InMemoryQueue;
pub use postgres::PgQueue;
pub use task::{AdvanceTask, Job};

/// Default delivery budget per job before it is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Schedule `task` to become due at `run_at`. Returns the job id.
    async fn enqueue(&self, task: AdvanceTask, run_at: DateTime<Utc>) -> Result<Uuid, QueueError>;
}

#[async_trait]
pub trait JobSource: Send + Sync {
    /// Claim the earliest job due at `now`, if any.
    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Option<Job>, QueueError>;

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError>;

    /// Return a job for redelivery at `retry_at`. Dead-letters it when its
    /// attempts are spent.
    async fn fail(&self, job: &Job, error: &str, retry_at: DateTime<Utc>) -> Result<(), QueueError>;

    /// Put jobs claimed before `stale_before` and never settled back in
    /// line. Returns how many were reclaimed.
    async fn reclaim_stale(&self, stale_before: DateTime<Utc>) -> Result<usize, QueueError>;
}
