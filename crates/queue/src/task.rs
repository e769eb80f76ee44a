//! The unit of work carried by the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// "Advance this execution by one step."
///
/// Every task pins the `(step, step_attempts)` pair it was created for. A
/// task that no longer matches the record is a stale duplicate and the
/// engine drops it, so redelivered copies never run a later step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceTask {
    pub execution_id: Uuid,
    pub expected_step: u32,
    pub expected_attempts: u32,
}

impl AdvanceTask {
    /// First try of `step`.
    pub fn at_step(execution_id: Uuid, step: u32) -> Self {
        Self::retry(execution_id, step, 0)
    }

    /// Another try of `step` after `attempts` earlier claims.
    pub fn retry(execution_id: Uuid, step: u32, attempts: u32) -> Self {
        Self { execution_id, expected_step: step, expected_attempts: attempts }
    }

    /// Whether the task still applies to a record at `(step, attempts)`.
    pub fn matches(&self, step: u32, attempts: u32) -> bool {
        self.expected_step == step && self.expected_attempts == attempts
    }
}

/// A claimed job handed to a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: Uuid,
    pub task: AdvanceTask,
    /// Deliveries so far, including this one.
    pub attempts: u32,
    pub max_attempts: u32,
    pub run_at: DateTime<Utc>,
}

impl Job {
    /// Whether a failure now would dead-letter the job.
    pub fn is_last_attempt(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pinned_tasks_match_only_their_step_and_attempts() {
        let id = Uuid::new_v4();
        assert!(AdvanceTask::at_step(id, 2).matches(2, 0));
        assert!(!AdvanceTask::at_step(id, 2).matches(2, 1));
        assert!(!AdvanceTask::at_step(id, 2).matches(3, 0));
        assert!(AdvanceTask::retry(id, 2, 1).matches(2, 1));
    }

    #[test]
    fn payload_without_a_pin_is_rejected() {
        let id = Uuid::new_v4();
        let decoded = serde_json::from_value::<AdvanceTask>(serde_json::json!({ "execution_id": id, "expected_step": 1 }));
        assert!(decoded.is_err());
    }
}
