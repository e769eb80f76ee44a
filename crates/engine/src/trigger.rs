//! Trigger resolution: turn a business event into execution records.

use std::sync::Arc;

use chrono::{Duration, Utc};
use queue::AdvanceTask;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::executor::SequenceEngine;
use crate::store::CustomerCriteria;
use crate::{EngineError, ExecutionRecord, TriggerType};

/// Upper bound on customers resolved by one trigger.
pub const MAX_BATCH: usize = 10_000;

/// Narrows the customers a trigger resolves to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerFilter {
    #[serde(default)]
    pub customer_ids: Option<Vec<Uuid>>,
    /// `new_customer`: created within this many days.
    #[serde(default = "default_created_within_days")]
    pub created_within_days: u32,
    /// `inactive_customer`: no activity for this many days.
    #[serde(default = "default_inactive_for_days")]
    pub inactive_for_days: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

fn default_created_within_days() -> u32 {
    1
}

fn default_inactive_for_days() -> u32 {
    30
}

impl Default for TriggerFilter {
    fn default() -> Self {
        Self {
            customer_ids: None,
            created_within_days: default_created_within_days(),
            inactive_for_days: default_inactive_for_days(),
            tags: Vec::new(),
            limit: None,
        }
    }
}

impl TriggerFilter {
    pub fn customers(ids: Vec<Uuid>) -> Self {
        Self { customer_ids: Some(ids), ..Default::default() }
    }

    fn criteria(&self, trigger_type: TriggerType) -> CustomerCriteria {
        let now = Utc::now();
        let mut criteria = CustomerCriteria {
            ids: self.customer_ids.clone(),
            tags: self.tags.clone(),
            limit: self.limit.unwrap_or(MAX_BATCH).min(MAX_BATCH),
            ..Default::default()
        };
        match trigger_type {
            TriggerType::NewCustomer => {
                criteria.created_after = Some(now - Duration::days(i64::from(self.created_within_days)));
            }
            TriggerType::InactiveCustomer => {
                criteria.inactive_since = Some(now - Duration::days(i64::from(self.inactive_for_days)));
            }
            TriggerType::Manual | TriggerType::Custom => {}
        }
        criteria
    }
}

/// Result of one `start_sequence` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartSummary {
    pub sequence_id: Uuid,
    pub matched: usize,
    pub started: usize,
    /// Customers already running this sequence.
    pub skipped_existing: usize,
    pub execution_ids: Vec<Uuid>,
}

pub struct TriggerService {
    engine: Arc<SequenceEngine>,
}

impl TriggerService {
    pub fn new(engine: Arc<SequenceEngine>) -> Self {
        Self { engine }
    }

    /// Create one record per matching customer and advance each once.
    ///
    /// # Errors
    /// - [`EngineError::SequenceNotFound`] / [`EngineError::SequenceDeactivated`].
    /// - [`EngineError::TriggerMismatch`] when a non-manual trigger doesn't
    ///   match the sequence's own trigger type.
    #[instrument(skip(self, filter), fields(sequence_id = %sequence_id, trigger = %trigger_type))]
    pub async fn start_sequence(
        &self,
        sequence_id: Uuid,
        trigger_type: TriggerType,
        filter: &TriggerFilter,
    ) -> Result<StartSummary, EngineError> {
        let stores = self.engine.stores();
        let sequence = stores
            .sequences
            .get_sequence(sequence_id)
            .await?
            .ok_or(EngineError::SequenceNotFound(sequence_id))?;
        if !sequence.active {
            return Err(EngineError::SequenceDeactivated(sequence_id));
        }
        if trigger_type != TriggerType::Manual && trigger_type != sequence.trigger_type {
            return Err(EngineError::TriggerMismatch {
                expected: sequence.trigger_type,
                requested: trigger_type,
            });
        }

        let customers = stores.customers.find_customers(&filter.criteria(trigger_type)).await?;
        let mut summary = StartSummary {
            sequence_id,
            matched: customers.len(),
            started: 0,
            skipped_existing: 0,
            execution_ids: Vec::with_capacity(customers.len()),
        };

        for customer in customers {
            if stores.executions.find_active(sequence_id, customer.id).await?.is_some() {
                summary.skipped_existing += 1;
                continue;
            }

            let record = ExecutionRecord::start(&sequence, customer.id);
            stores.executions.create_execution(&record).await?;
            summary.started += 1;
            summary.execution_ids.push(record.id);

            let first = AdvanceTask::at_step(record.id, 0);
            if let Err(err) = self.engine.advance(first).await {
                // The record exists; hand its first step to the queue instead.
                warn!("first advance of {} failed, queueing it: {}", record.id, err);
                self.engine.scheduler().enqueue(first, Utc::now()).await?;
            }
        }

        info!(
            "sequence '{}' started for {} of {} matched customer(s), {} already running",
            sequence.name, summary.started, summary.matched, summary.skipped_existing
        );
        Ok(summary)
    }
}
