//! In-process queue for tests and single-process setups.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::{AdvanceTask, Job, JobSource, QueueError, Scheduler, DEFAULT_MAX_ATTEMPTS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotStatus {
    Pending,
    Processing,
    DeadLettered,
}

#[derive(Debug, Clone)]
struct Slot {
    id: Uuid,
    task: AdvanceTask,
    status: SlotStatus,
    attempts: u32,
    run_at: DateTime<Utc>,
    claimed_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// A queue held in a mutex-guarded `Vec`. Completed jobs leave the `Vec`.
pub struct InMemoryQueue {
    slots: Mutex<Vec<Slot>>,
    completed: AtomicUsize,
    max_attempts: u32,
    /// Number of upcoming `enqueue` calls that should fail.
    failing_enqueues: AtomicUsize,
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::with_max_attempts(DEFAULT_MAX_ATTEMPTS)
    }

    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            completed: AtomicUsize::new(0),
            max_attempts: max_attempts.max(1),
            failing_enqueues: AtomicUsize::new(0),
        }
    }

    /// Make the next `n` enqueues fail with `QueueError::Unavailable`.
    pub fn fail_next_enqueues(&self, n: usize) {
        self.failing_enqueues.store(n, Ordering::SeqCst);
    }

    /// Pending tasks with their due times, earliest first.
    pub fn pending(&self) -> Vec<(AdvanceTask, DateTime<Utc>)> {
        let mut pending: Vec<_> = self
            .slots
            .lock()
            .iter()
            .filter(|s| s.status == SlotStatus::Pending)
            .map(|s| (s.task, s.run_at))
            .collect();
        pending.sort_by_key(|(_, at)| *at);
        pending
    }

    pub fn pending_count(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.status == SlotStatus::Pending).count()
    }

    /// Tasks that ran out of attempts, with their last error.
    pub fn dead_lettered(&self) -> Vec<(AdvanceTask, Option<String>)> {
        self.slots
            .lock()
            .iter()
            .filter(|s| s.status == SlotStatus::DeadLettered)
            .map(|s| (s.task, s.last_error.clone()))
            .collect()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Claimed jobs not yet settled.
    pub fn in_flight_count(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.status == SlotStatus::Processing).count()
    }

    /// Slots still held: pending, in flight or dead-lettered.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every pending task and return them, earliest first. Lets tests
    /// drive execution by hand.
    pub fn drain_pending(&self) -> Vec<(AdvanceTask, DateTime<Utc>)> {
        let mut slots = self.slots.lock();
        let mut drained: Vec<_> = slots
            .iter()
            .filter(|s| s.status == SlotStatus::Pending)
            .map(|s| (s.task, s.run_at))
            .collect();
        slots.retain(|s| s.status != SlotStatus::Pending);
        drained.sort_by_key(|(_, at)| *at);
        drained
    }
}

#[async_trait]
impl Scheduler for InMemoryQueue {
    async fn enqueue(&self, task: AdvanceTask, run_at: DateTime<Utc>) -> Result<Uuid, QueueError> {
        let injected = self
            .failing_enqueues
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(QueueError::Unavailable("injected enqueue failure".into()));
        }

        let id = Uuid::new_v4();
        self.slots.lock().push(Slot {
            id,
            task,
            status: SlotStatus::Pending,
            attempts: 0,
            run_at,
            claimed_at: None,
            last_error: None,
        });
        Ok(id)
    }
}

#[async_trait]
impl JobSource for InMemoryQueue {
    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Option<Job>, QueueError> {
        let mut slots = self.slots.lock();
        let next = slots
            .iter_mut()
            .filter(|s| s.status == SlotStatus::Pending && s.run_at <= now)
            .min_by_key(|s| s.run_at);

        Ok(next.map(|slot| {
            slot.status = SlotStatus::Processing;
            slot.attempts += 1;
            slot.claimed_at = Some(now);
            Job {
                id: slot.id,
                task: slot.task,
                attempts: slot.attempts,
                max_attempts: self.max_attempts,
                run_at: slot.run_at,
            }
        }))
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut slots = self.slots.lock();
        let index = slots.iter().position(|s| s.id == job_id).ok_or(QueueError::UnknownJob(job_id))?;
        slots.swap_remove(index);
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fail(&self, job: &Job, error: &str, retry_at: DateTime<Utc>) -> Result<(), QueueError> {
        let mut slots = self.slots.lock();
        let slot = slots.iter_mut().find(|s| s.id == job.id).ok_or(QueueError::UnknownJob(job.id))?;
        slot.last_error = Some(error.to_string());
        slot.claimed_at = None;
        if slot.attempts >= self.max_attempts {
            warn!("job {} dead-lettered after {} attempts: {}", job.id, slot.attempts, error);
            slot.status = SlotStatus::DeadLettered;
        } else {
            slot.status = SlotStatus::Pending;
            slot.run_at = retry_at;
        }
        Ok(())
    }

    async fn reclaim_stale(&self, stale_before: DateTime<Utc>) -> Result<usize, QueueError> {
        let mut reclaimed = 0;
        for slot in self.slots.lock().iter_mut() {
            if slot.status == SlotStatus::Processing && slot.claimed_at.is_some_and(|at| at < stale_before) {
                warn!("reclaiming job {} claimed at {:?} and never settled", slot.id, slot.claimed_at);
                slot.status = SlotStatus::Pending;
                slot.claimed_at = None;
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn only_due_jobs_are_claimed_earliest_first() {
        let q = InMemoryQueue::new();
        let now = Utc::now();
        let late = AdvanceTask::at_step(Uuid::new_v4(), 1);
        let early = AdvanceTask::at_step(Uuid::new_v4(), 0);
        q.enqueue(late, now + Duration::hours(1)).await.unwrap();
        q.enqueue(early, now - Duration::seconds(1)).await.unwrap();

        let job = q.claim_due(now).await.unwrap().expect("one job due");
        assert_eq!(job.task, early);
        assert_eq!(job.attempts, 1);
        assert!(q.claim_due(now).await.unwrap().is_none());

        let later = q.claim_due(now + Duration::hours(2)).await.unwrap().expect("late job due");
        assert_eq!(later.task, late);
    }

    #[tokio::test]
    async fn failed_jobs_are_retried_then_dead_lettered() {
        let q = InMemoryQueue::with_max_attempts(2);
        let now = Utc::now();
        let task = AdvanceTask::at_step(Uuid::new_v4(), 0);
        q.enqueue(task, now).await.unwrap();

        let first = q.claim_due(now).await.unwrap().unwrap();
        q.fail(&first, "db down", now + Duration::seconds(5)).await.unwrap();
        assert!(q.claim_due(now).await.unwrap().is_none());

        let second = q.claim_due(now + Duration::seconds(5)).await.unwrap().unwrap();
        assert!(second.is_last_attempt());
        q.fail(&second, "still down", now).await.unwrap();

        assert_eq!(q.pending_count(), 0);
        assert_eq!(q.dead_lettered(), vec![(task, Some("still down".to_string()))]);
    }

    #[tokio::test]
    async fn unsettled_claims_are_redelivered_after_the_lease() {
        let q = InMemoryQueue::new();
        let now = Utc::now();
        let task = AdvanceTask::at_step(Uuid::new_v4(), 0);
        q.enqueue(task, now).await.unwrap();
        let abandoned = q.claim_due(now).await.unwrap().unwrap();

        // Still inside the lease: nothing to reclaim.
        assert_eq!(q.reclaim_stale(now - Duration::minutes(5)).await.unwrap(), 0);
        assert!(q.claim_due(now + Duration::days(7)).await.unwrap().is_none());

        assert_eq!(q.reclaim_stale(now + Duration::minutes(5)).await.unwrap(), 1);
        let again = q.claim_due(now + Duration::minutes(5)).await.unwrap().expect("redelivered");
        assert_eq!(again.id, abandoned.id);
        assert_eq!(again.task, task);
        assert_eq!(again.attempts, 2);
    }

    #[tokio::test]
    async fn completed_jobs_are_removed() {
        let q = InMemoryQueue::new();
        let now = Utc::now();
        for step in 0..3 {
            q.enqueue(AdvanceTask::at_step(Uuid::new_v4(), step), now).await.unwrap();
        }
        while let Some(job) = q.claim_due(now).await.unwrap() {
            q.complete(job.id).await.unwrap();
        }

        assert!(q.is_empty());
        assert_eq!(q.completed_count(), 3);
        assert_eq!(q.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn injected_enqueue_failures_are_consumed() {
        let q = InMemoryQueue::new();
        q.fail_next_enqueues(1);
        let task = AdvanceTask::at_step(Uuid::new_v4(), 0);
        assert!(matches!(q.enqueue(task, Utc::now()).await, Err(QueueError::Unavailable(_))));
        assert!(q.enqueue(task, Utc::now()).await.is_ok());
        assert_eq!(q.pending_count(), 1);
    }
}
