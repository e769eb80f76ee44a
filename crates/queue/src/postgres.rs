//! Queue backed by the `job_queue` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use db::models::JobRow;
use db::repository::jobs;
use db::DbPool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{AdvanceTask, Job, JobSource, QueueError, Scheduler, DEFAULT_MAX_ATTEMPTS};

#[derive(Clone)]
pub struct PgQueue {
    pool: DbPool,
    max_attempts: u32,
}

impl PgQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, max_attempts: DEFAULT_MAX_ATTEMPTS }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub async fn pending_count(&self) -> Result<i64, QueueError> {
        Ok(jobs::pending_count(&self.pool).await?)
    }
}

fn to_job(row: JobRow) -> Result<Job, QueueError> {
    let task: AdvanceTask = serde_json::from_value(row.payload)?;
    Ok(Job {
        id: row.id,
        task,
        attempts: u32::try_from(row.attempts).unwrap_or(0),
        max_attempts: u32::try_from(row.max_attempts).unwrap_or(1),
        run_at: row.run_at,
    })
}

#[async_trait]
impl Scheduler for PgQueue {
    async fn enqueue(&self, task: AdvanceTask, run_at: DateTime<Utc>) -> Result<Uuid, QueueError> {
        let payload = serde_json::to_value(task)?;
        let max_attempts = i32::try_from(self.max_attempts).unwrap_or(i32::MAX);
        let row = jobs::enqueue_job(&self.pool, task.execution_id, payload, run_at, max_attempts).await?;
        debug!("enqueued job {} for execution {} at {}", row.id, task.execution_id, run_at);
        Ok(row.id)
    }
}

#[async_trait]
impl JobSource for PgQueue {
    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Option<Job>, QueueError> {
        jobs::fetch_next_due(&self.pool, now).await?.map(to_job).transpose()
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError> {
        Ok(jobs::complete_job(&self.pool, job_id).await?)
    }

    async fn fail(&self, job: &Job, error: &str, retry_at: DateTime<Utc>) -> Result<(), QueueError> {
        Ok(jobs::fail_job(&self.pool, job.id, error, retry_at).await?)
    }

    async fn reclaim_stale(&self, stale_before: DateTime<Utc>) -> Result<usize, QueueError> {
        let reclaimed = jobs::reclaim_stale_jobs(&self.pool, stale_before).await?;
        if reclaimed > 0 {
            warn!("reclaimed {} job(s) claimed before {} and never settled", reclaimed, stale_before);
        }
        Ok(usize::try_from(reclaimed).unwrap_or(usize::MAX))
    }
}
