//! Queue worker: claim a due job, advance its execution, settle the job.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use queue::{Job, JobSource, QueueError};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::executor::{AdvanceOutcome, SequenceEngine};

/// `[worker]` configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Sleep between polls when nothing is due.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Deliveries per job before it is dead-lettered.
    #[serde(default = "default_max_job_attempts")]
    pub max_job_attempts: u32,
    /// Base of the exponential back-off between job retries.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    /// A claimed job not settled within this long is handed out again.
    #[serde(default = "default_lease_ms")]
    pub lease_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_job_attempts() -> u32 {
    queue::DEFAULT_MAX_ATTEMPTS
}

fn default_retry_base_ms() -> u64 {
    5000
}

fn default_lease_ms() -> u64 {
    300_000
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_job_attempts: default_max_job_attempts(),
            retry_base_ms: default_retry_base_ms(),
            lease_ms: default_lease_ms(),
        }
    }
}

/// What [`Worker::run_once`] found.
#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    Idle,
    Processed(AdvanceOutcome),
    /// The advance failed; the job went back to the queue.
    Retried,
    /// The advance failed with an error retrying can't fix.
    Dropped,
}

pub struct Worker {
    source: Arc<dyn JobSource>,
    engine: Arc<SequenceEngine>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(source: Arc<dyn JobSource>, engine: Arc<SequenceEngine>, config: WorkerConfig) -> Self {
        Self { source, engine, config }
    }

    /// Reclaim expired leases, then claim and process at most one due job.
    pub async fn run_once(&self) -> Result<Tick, QueueError> {
        let now = Utc::now();
        let lease = i64::try_from(self.config.lease_ms).unwrap_or(i64::MAX);
        self.source.reclaim_stale(now - chrono::Duration::milliseconds(lease)).await?;

        let Some(job) = self.source.claim_due(now).await? else {
            return Ok(Tick::Idle);
        };
        debug!("claimed job {} (attempt {}/{})", job.id, job.attempts, job.max_attempts);

        match self.engine.advance(job.task).await {
            Ok(outcome) => {
                self.source.complete(job.id).await?;
                Ok(Tick::Processed(outcome))
            }
            Err(err) if err.is_transient() => {
                warn!("job {} failed, will retry: {}", job.id, err);
                self.source.fail(&job, &err.to_string(), Utc::now() + self.backoff(&job)).await?;
                Ok(Tick::Retried)
            }
            Err(err) => {
                error!("job {} dropped: {}", job.id, err);
                self.source.complete(job.id).await?;
                Ok(Tick::Dropped)
            }
        }
    }

    fn backoff(&self, job: &Job) -> chrono::Duration {
        let factor = 2i64.saturating_pow(job.attempts.saturating_sub(1));
        let base = i64::try_from(self.config.retry_base_ms).unwrap_or(i64::MAX);
        chrono::Duration::milliseconds(base.saturating_mul(factor).min(3_600_000))
    }

    /// Poll until `shutdown` flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("worker started (poll every {} ms)", self.config.poll_interval_ms);
        let idle = Duration::from_millis(self.config.poll_interval_ms);

        while !*shutdown.borrow() {
            let pause = match self.run_once().await {
                Ok(Tick::Idle) => Some(idle),
                Ok(_) => None,
                Err(err) => {
                    error!("queue error: {}", err);
                    Some(idle)
                }
            };

            if let Some(pause) = pause {
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    changed = shutdown.changed() => {
                        // Sender gone: nobody can ask us to stop any more.
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }
        info!("worker stopped");
    }
}
