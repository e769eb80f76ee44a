//! In-memory implementation of every engine store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::{
    CustomerCriteria, CustomerDirectory, ExecutionChange, ExecutionFilter, ExecutionStore, SequenceStore, StepGuard,
};
use crate::{Customer, ExecutionRecord, ExecutionStatus, SequenceDefinition, StoreError};

#[derive(Default)]
struct State {
    sequences: HashMap<Uuid, SequenceDefinition>,
    executions: HashMap<Uuid, ExecutionRecord>,
    /// Ids of soft-deleted executions.
    pruned: Vec<Uuid>,
    customers: HashMap<Uuid, Customer>,
}

/// Sequences, executions and customers behind one lock. Commits take the
/// write lock, so the compare-and-swap is atomic.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_customer(&self, customer: Customer) {
        self.state.write().customers.insert(customer.id, customer);
    }

    pub fn remove_customer(&self, id: Uuid) {
        self.state.write().customers.remove(&id);
    }

    /// Every record including soft-deleted ones.
    pub fn execution_count(&self) -> usize {
        self.state.read().executions.len()
    }
}

#[async_trait]
impl SequenceStore for InMemoryStore {
    async fn create_sequence(&self, sequence: &SequenceDefinition) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if state.sequences.contains_key(&sequence.id) {
            return Err(StoreError::Duplicate { entity: "sequence", id: sequence.id });
        }
        state.sequences.insert(sequence.id, sequence.clone());
        Ok(())
    }

    async fn get_sequence(&self, id: Uuid) -> Result<Option<SequenceDefinition>, StoreError> {
        Ok(self.state.read().sequences.get(&id).cloned())
    }

    async fn list_sequences(&self) -> Result<Vec<SequenceDefinition>, StoreError> {
        let mut all: Vec<_> = self.state.read().sequences.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool, StoreError> {
        Ok(match self.state.write().sequences.get_mut(&id) {
            Some(seq) => {
                seq.active = active;
                true
            }
            None => false,
        })
    }
}

#[async_trait]
impl ExecutionStore for InMemoryStore {
    async fn create_execution(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if state.executions.contains_key(&record.id) {
            return Err(StoreError::Duplicate { entity: "execution", id: record.id });
        }
        state.executions.insert(record.id, record.clone());
        Ok(())
    }

    async fn get_execution(&self, id: Uuid) -> Result<Option<ExecutionRecord>, StoreError> {
        let state = self.state.read();
        if state.pruned.contains(&id) {
            return Ok(None);
        }
        Ok(state.executions.get(&id).cloned())
    }

    async fn find_active(&self, sequence_id: Uuid, customer_id: Uuid) -> Result<Option<ExecutionRecord>, StoreError> {
        Ok(self
            .state
            .read()
            .executions
            .values()
            .find(|r| r.sequence_id == sequence_id && r.customer_id == customer_id && r.is_active())
            .cloned())
    }

    async fn commit(
        &self,
        id: Uuid,
        guard: StepGuard,
        change: ExecutionChange,
    ) -> Result<Option<ExecutionRecord>, StoreError> {
        let mut state = self.state.write();
        let Some(record) = state.executions.get_mut(&id) else {
            return Ok(None);
        };
        if !record.is_active() || StepGuard::of(record) != guard {
            return Ok(None);
        }

        record.current_step = change.current_step;
        record.step_attempts = change.step_attempts;
        record.status = change.status;
        record.execution_data.extend(change.append);
        record.completed_at = change.completed_at.or(record.completed_at);
        record.failed_at = change.failed_at.or(record.failed_at);
        record.failure_reason = change.failure_reason.or(record.failure_reason.take());
        Ok(Some(record.clone()))
    }

    async fn list_executions(&self, filter: &ExecutionFilter) -> Result<Vec<ExecutionRecord>, StoreError> {
        let state = self.state.read();
        let mut matched: Vec<_> = state
            .executions
            .values()
            .filter(|r| !state.pruned.contains(&r.id))
            .filter(|r| filter.sequence_id.map_or(true, |id| r.sequence_id == id))
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        matched.truncate(filter.limit);
        Ok(matched)
    }

    async fn prune_finished(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.write();
        let doomed: Vec<Uuid> = state
            .executions
            .values()
            .filter(|r| r.status != ExecutionStatus::Active && r.started_at < before)
            .map(|r| r.id)
            .filter(|id| !state.pruned.contains(id))
            .collect();
        let count = doomed.len() as u64;
        state.pruned.extend(doomed);
        Ok(count)
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryStore {
    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>, StoreError> {
        Ok(self.state.read().customers.get(&id).cloned())
    }

    async fn find_customers(&self, criteria: &CustomerCriteria) -> Result<Vec<Customer>, StoreError> {
        let mut matched: Vec<_> = self
            .state
            .read()
            .customers
            .values()
            .filter(|c| criteria.matches(c))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        matched.truncate(criteria.limit);
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StepDefinition, TriggerType};
    use chrono::Duration;
    use providers::Channel;

    fn record() -> ExecutionRecord {
        let seq = SequenceDefinition::new("s", TriggerType::Manual, vec![StepDefinition::message(Channel::Sms, "x")]);
        ExecutionRecord::start(&seq, Uuid::new_v4())
    }

    fn advance_to(step: u32) -> ExecutionChange {
        ExecutionChange {
            current_step: step,
            step_attempts: 0,
            status: ExecutionStatus::Active,
            append: Vec::new(),
            completed_at: None,
            failed_at: None,
            failure_reason: None,
        }
    }

    #[tokio::test]
    async fn commit_is_guarded_on_step_and_attempts() {
        let store = InMemoryStore::new();
        let rec = record();
        store.create_execution(&rec).await.unwrap();

        let guard = StepGuard::of(&rec);
        assert!(store.commit(rec.id, guard, advance_to(1)).await.unwrap().is_some());
        // Same guard again: the record has moved on.
        assert!(store.commit(rec.id, guard, advance_to(2)).await.unwrap().is_none());
        assert_eq!(store.get_execution(rec.id).await.unwrap().unwrap().current_step, 1);
    }

    #[tokio::test]
    async fn finished_records_are_immutable() {
        let store = InMemoryStore::new();
        let rec = record();
        store.create_execution(&rec).await.unwrap();

        let mut done = advance_to(1);
        done.status = ExecutionStatus::Completed;
        let after = store.commit(rec.id, StepGuard::of(&rec), done).await.unwrap().unwrap();

        assert!(store.commit(rec.id, StepGuard::of(&after), advance_to(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn prune_hides_only_old_finished_records() {
        let store = InMemoryStore::new();
        let mut old_done = record();
        old_done.status = ExecutionStatus::Completed;
        old_done.started_at = Utc::now() - Duration::days(100);
        let mut old_active = record();
        old_active.started_at = Utc::now() - Duration::days(100);
        store.create_execution(&old_done).await.unwrap();
        store.create_execution(&old_active).await.unwrap();

        let pruned = store.prune_finished(Utc::now() - Duration::days(90)).await.unwrap();
        assert_eq!(pruned, 1);
        assert!(store.get_execution(old_done.id).await.unwrap().is_none());
        assert!(store.get_execution(old_active.id).await.unwrap().is_some());
        assert_eq!(store.execution_count(), 2);
    }

    #[tokio::test]
    async fn customer_criteria_filter_by_tags_and_activity() {
        let store = InMemoryStore::new();
        let mut vip = Customer::new("A");
        vip.tags = vec!["vip".into()];
        vip.last_activity_at = Some(Utc::now() - Duration::days(60));
        let mut fresh = Customer::new("B");
        fresh.tags = vec!["vip".into()];
        fresh.last_activity_at = Some(Utc::now());
        store.insert_customer(vip.clone());
        store.insert_customer(fresh);

        let criteria = CustomerCriteria {
            tags: vec!["vip".into()],
            inactive_since: Some(Utc::now() - Duration::days(30)),
            limit: 10,
            ..Default::default()
        };
        let found = store.find_customers(&criteria).await.unwrap();
        assert_eq!(found.iter().map(|c| c.id).collect::<Vec<_>>(), vec![vip.id]);
    }
}
