//! Storage seams for definitions, execution records and customers.
//!
//! The engine depends only on these traits. [`InMemoryStore`] backs tests
//! and single-process runs; [`PgStore`] backs production.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{Customer, ExecutionRecord, ExecutionStatus, SequenceDefinition, StepOutcome, StoreError};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// The `(current_step, step_attempts)` a commit expects to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepGuard {
    pub current_step: u32,
    pub step_attempts: u32,
}

impl StepGuard {
    pub fn of(record: &ExecutionRecord) -> Self {
        Self { current_step: record.current_step, step_attempts: record.step_attempts }
    }
}

/// New column values for a guarded commit. `append` is added to the end of
/// `execution_data`; timestamps and reason are only written when `Some`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionChange {
    pub current_step: u32,
    pub step_attempts: u32,
    pub status: ExecutionStatus,
    pub append: Vec<StepOutcome>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionFilter {
    pub sequence_id: Option<Uuid>,
    pub status: Option<ExecutionStatus>,
    pub limit: usize,
}

/// Customer selection used by trigger resolution. Present criteria all
/// must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomerCriteria {
    pub ids: Option<Vec<Uuid>>,
    pub created_after: Option<DateTime<Utc>>,
    /// Last activity before this instant, or none at all.
    pub inactive_since: Option<DateTime<Utc>>,
    /// Must carry every tag listed.
    pub tags: Vec<String>,
    pub limit: usize,
}

impl CustomerCriteria {
    pub fn matches(&self, c: &Customer) -> bool {
        self.ids.as_ref().map_or(true, |ids| ids.contains(&c.id))
            && self.created_after.map_or(true, |t| c.created_at >= t)
            && self
                .inactive_since
                .map_or(true, |t| c.last_activity_at.map_or(true, |last| last < t))
            && self.tags.iter().all(|t| c.tags.contains(t))
    }
}

#[async_trait]
pub trait SequenceStore: Send + Sync {
    async fn create_sequence(&self, sequence: &SequenceDefinition) -> Result<(), StoreError>;

    async fn get_sequence(&self, id: Uuid) -> Result<Option<SequenceDefinition>, StoreError>;

    /// Newest first.
    async fn list_sequences(&self) -> Result<Vec<SequenceDefinition>, StoreError>;

    /// Returns `false` when no such sequence exists.
    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn create_execution(&self, record: &ExecutionRecord) -> Result<(), StoreError>;

    async fn get_execution(&self, id: Uuid) -> Result<Option<ExecutionRecord>, StoreError>;

    /// The `active` record of `sequence_id` for `customer_id`, if any.
    async fn find_active(&self, sequence_id: Uuid, customer_id: Uuid) -> Result<Option<ExecutionRecord>, StoreError>;

    /// Atomic compare-and-swap. Applies `change` only if the record is
    /// still `active` and matches `guard`; returns the updated record, or
    /// `None` when another invocation got there first.
    async fn commit(
        &self,
        id: Uuid,
        guard: StepGuard,
        change: ExecutionChange,
    ) -> Result<Option<ExecutionRecord>, StoreError>;

    /// Newest first.
    async fn list_executions(&self, filter: &ExecutionFilter) -> Result<Vec<ExecutionRecord>, StoreError>;

    /// Soft-delete finished records started before `before`.
    async fn prune_finished(&self, before: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>, StoreError>;

    /// Oldest first, at most `criteria.limit`.
    async fn find_customers(&self, criteria: &CustomerCriteria) -> Result<Vec<Customer>, StoreError>;
}
