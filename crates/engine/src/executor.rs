//! Sequence execution engine.
//!
//! `SequenceEngine::advance` moves one Execution Record forward by exactly
//! one step and returns:
//! 1. Loads the record and drops stale or duplicate tasks.
//! 2. Re-checks the live definition (missing or deactivated fails the record).
//! 3. Delay step: schedules the next invocation and advances.
//! 4. Message step: claims the step, sends through the gateway, advances.
//!
//! Every write is a compare-and-swap on `(current_step, step_attempts)`, so
//! duplicate deliveries of the same task cannot process a step twice. The
//! continuation is always enqueued before the commit that moves the step:
//! if the enqueue fails the commit never happens and the redelivered task
//! redoes the step.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use gateway::{AttemptContext, DeliveryGateway, DeliveryReport, DeliveryRequest, MetricsSink};
use providers::{Channel, TemplateRef};
use queue::{AdvanceTask, Scheduler};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{DeliveryFailurePolicy, EngineConfig};
use crate::error::ALL_PROVIDERS_EXHAUSTED;
use crate::personalize::{personalize, personalize_params};
use crate::store::{CustomerDirectory, ExecutionChange, ExecutionStore, SequenceStore, StepGuard};
use crate::validate::check_step;
use crate::{Customer, EngineError, ExecutionRecord, ExecutionStatus, OutcomeKind, StepDefinition, StepOutcome};

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// The three stores the engine reads and writes.
#[derive(Clone)]
pub struct EngineStores {
    pub sequences: Arc<dyn SequenceStore>,
    pub executions: Arc<dyn ExecutionStore>,
    pub customers: Arc<dyn CustomerDirectory>,
}

impl EngineStores {
    /// Use one backend for all three.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: SequenceStore + ExecutionStore + CustomerDirectory + 'static,
    {
        Self {
            sequences: store.clone(),
            executions: store.clone(),
            customers: store,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome of one invocation
// ---------------------------------------------------------------------------

/// What a single `advance` call did.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    /// Delay step: the next step runs at `run_at`.
    Scheduled { run_at: DateTime<Utc> },
    Sent { provider: String },
    /// Every provider failed. `retry_at` is set when the step was rescheduled.
    DeliveryFailed { retry_at: Option<DateTime<Utc>> },
    /// Message step skipped without a delivery attempt.
    Skipped { reason: String },
    /// The record had no steps left.
    Completed,
    /// The record moved to `failed`.
    Failed { reason: String },
    /// A duplicate or outdated task; the record was left alone.
    Stale,
    /// The record is already `completed` or `failed`.
    NotActive,
}

// ---------------------------------------------------------------------------
// SequenceEngine
// ---------------------------------------------------------------------------

pub struct SequenceEngine {
    stores: EngineStores,
    gateway: Arc<DeliveryGateway>,
    scheduler: Arc<dyn Scheduler>,
    sink: Arc<dyn MetricsSink>,
    config: EngineConfig,
}

impl SequenceEngine {
    pub fn new(
        stores: EngineStores,
        gateway: Arc<DeliveryGateway>,
        scheduler: Arc<dyn Scheduler>,
        sink: Arc<dyn MetricsSink>,
        config: EngineConfig,
    ) -> Self {
        Self { stores, gateway, scheduler, sink, config }
    }

    pub fn stores(&self) -> &EngineStores {
        &self.stores
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    /// Process one step of `task.execution_id`.
    ///
    /// # Errors
    /// Store and queue failures propagate so the caller's job is redelivered.
    /// Definition, customer and step errors are recorded on the record as
    /// `failed` and returned as [`AdvanceOutcome::Failed`].
    #[instrument(skip(self), fields(execution_id = %task.execution_id))]
    pub async fn advance(&self, task: AdvanceTask) -> Result<AdvanceOutcome, EngineError> {
        let record = self
            .stores
            .executions
            .get_execution(task.execution_id)
            .await?
            .ok_or(EngineError::ExecutionNotFound(task.execution_id))?;

        if !record.is_active() {
            debug!("execution is {}, nothing to do", record.status.as_str());
            return Ok(AdvanceOutcome::NotActive);
        }
        if !task.matches(record.current_step, record.step_attempts) {
            debug!(
                "stale task for step {}/{} (record is at {}/{})",
                task.expected_step, task.expected_attempts, record.current_step, record.step_attempts
            );
            return Ok(AdvanceOutcome::Stale);
        }

        match self.process(&record).await {
            Err(err) if err.is_fatal() => self.fail(&record, &err).await,
            other => other,
        }
    }

    async fn process(&self, record: &ExecutionRecord) -> Result<AdvanceOutcome, EngineError> {
        if record.is_exhausted() {
            return self.complete(record).await;
        }

        let sequence = self
            .stores
            .sequences
            .get_sequence(record.sequence_id)
            .await?
            .ok_or(EngineError::SequenceNotFound(record.sequence_id))?;
        if !sequence.active {
            return Err(EngineError::SequenceDeactivated(sequence.id));
        }

        let index = record.current_step as usize;
        let step = record.steps.get(index).ok_or_else(|| EngineError::MalformedStep {
            index,
            message: "step index out of range".into(),
        })?;
        check_step(index, step)?;

        match step {
            StepDefinition::Delay { hours } => self.delay(record, *hours).await,
            StepDefinition::SendMessage { channel, content, template_name, template_params } => {
                let template = template_name.as_ref().map(|name| TemplateRef {
                    name: name.clone(),
                    params: template_params.clone(),
                });
                self.send(record, *channel, content, template).await
            }
        }
    }

    // -----------------------------------------------------------------------
    // Step handlers
    // -----------------------------------------------------------------------

    async fn delay(&self, record: &ExecutionRecord, hours: u32) -> Result<AdvanceOutcome, EngineError> {
        let now = Utc::now();
        let run_at = now + Duration::hours(i64::from(hours));
        self.scheduler
            .enqueue(AdvanceTask::at_step(record.id, record.current_step + 1), run_at)
            .await?;

        let outcome = self.outcome(record, OutcomeKind::Scheduled { delay_hours: hours, run_at });
        let change = step_forward(record, vec![outcome]);
        if self.commit(record, change).await?.is_none() {
            return Ok(AdvanceOutcome::Stale);
        }

        info!("step {} delays {}h until {}", record.current_step, hours, run_at);
        self.sink.increment("sequence.step", &[("kind", "delay"), ("result", "scheduled")]);
        Ok(AdvanceOutcome::Scheduled { run_at })
    }

    async fn send(
        &self,
        record: &ExecutionRecord,
        channel: Channel,
        content: &str,
        template: Option<TemplateRef>,
    ) -> Result<AdvanceOutcome, EngineError> {
        let customer = self
            .stores
            .customers
            .get_customer(record.customer_id)
            .await?
            .ok_or(EngineError::CustomerNotFound(record.customer_id))?;

        let Some(address) = customer.address(channel) else {
            return self.skip(record, channel, "missing_address").await;
        };

        // Claim before any side effect. A duplicate task racing this one
        // either loses this swap or later finds attempts moved and is stale.
        let claim = ExecutionChange {
            current_step: record.current_step,
            step_attempts: record.step_attempts + 1,
            status: ExecutionStatus::Active,
            append: Vec::new(),
            completed_at: None,
            failed_at: None,
            failure_reason: None,
        };
        let Some(claimed) = self.commit(record, claim).await? else {
            return Ok(AdvanceOutcome::Stale);
        };

        let result = self.deliver(&claimed, &customer, address, channel, content, template).await;
        if result.is_err() {
            self.release(&claimed, record.step_attempts).await;
        }
        result
    }

    /// Send the claimed step and settle it according to the gateway report.
    async fn deliver(
        &self,
        claimed: &ExecutionRecord,
        customer: &Customer,
        address: &str,
        channel: Channel,
        content: &str,
        template: Option<TemplateRef>,
    ) -> Result<AdvanceOutcome, EngineError> {
        let request = DeliveryRequest {
            recipient: address.to_string(),
            message: personalize(content, customer),
            channel,
            template: template.map(|t| TemplateRef {
                params: personalize_params(&t.params, customer),
                name: t.name,
            }),
            context: AttemptContext {
                execution_id: Some(claimed.id),
                sequence_id: Some(claimed.sequence_id),
                customer_id: Some(claimed.customer_id),
            },
        };
        let report = self.gateway.send(&request).await;

        if report.rejected.as_deref() == Some("invalid_recipient") {
            return self.skip(claimed, channel, "invalid_recipient").await;
        }

        match report.provider_used.clone() {
            Some(provider) if report.success => {
                self.continue_now(claimed).await?;
                let outcome = self.outcome(
                    claimed,
                    OutcomeKind::Sent {
                        channel,
                        recipient: address.to_string(),
                        provider: provider.clone(),
                        attempts: report.attempts.len(),
                    },
                );
                if self.commit(claimed, step_forward(claimed, vec![outcome])).await?.is_none() {
                    warn!("record changed while step {} was being sent", claimed.current_step);
                    return Ok(AdvanceOutcome::Stale);
                }
                self.sink.increment("sequence.step", &[("kind", "send_message"), ("result", "sent")]);
                Ok(AdvanceOutcome::Sent { provider })
            }
            _ => self.delivery_failed(claimed, channel, address, &report).await,
        }
    }

    async fn skip(
        &self,
        record: &ExecutionRecord,
        channel: Channel,
        reason: &str,
    ) -> Result<AdvanceOutcome, EngineError> {
        warn!("skipping step {}: customer {} has {} for {}", record.current_step, record.customer_id, reason, channel);
        self.continue_now(record).await?;

        let outcome = self.outcome(record, OutcomeKind::Skipped { channel, reason: reason.to_string() });
        if self.commit(record, step_forward(record, vec![outcome])).await?.is_none() {
            return Ok(AdvanceOutcome::Stale);
        }
        self.sink.increment("sequence.step", &[("kind", "send_message"), ("result", "skipped")]);
        Ok(AdvanceOutcome::Skipped { reason: reason.to_string() })
    }

    async fn delivery_failed(
        &self,
        claimed: &ExecutionRecord,
        channel: Channel,
        recipient: &str,
        report: &DeliveryReport,
    ) -> Result<AdvanceOutcome, EngineError> {
        let failure = |retry_at| OutcomeKind::DeliveryFailed {
            channel,
            recipient: recipient.to_string(),
            attempts: report.attempts.len(),
            error: report.last_error().map(str::to_string),
            retry_at,
        };
        self.sink.increment("sequence.step", &[("kind", "send_message"), ("result", "failed")]);

        match &self.config.delivery_failure {
            DeliveryFailurePolicy::Stall => {
                warn!(
                    "all providers failed on step {}; record stays active with nothing scheduled",
                    claimed.current_step
                );
                let outcome = self.outcome(claimed, failure(None));
                if self.commit(claimed, step_forward(claimed, vec![outcome])).await?.is_none() {
                    return Ok(AdvanceOutcome::Stale);
                }
                Ok(AdvanceOutcome::DeliveryFailed { retry_at: None })
            }
            DeliveryFailurePolicy::Fail => self.exhausted(claimed, failure(None)).await,
            DeliveryFailurePolicy::Retry { max_attempts, base_delay_secs, max_delay_secs } => {
                if claimed.step_attempts >= *max_attempts {
                    return self.exhausted(claimed, failure(None)).await;
                }
                let wait = DeliveryFailurePolicy::backoff(*base_delay_secs, *max_delay_secs, claimed.step_attempts);
                let retry_at = Utc::now() + Duration::seconds(i64::try_from(wait.as_secs()).unwrap_or(i64::MAX));
                self.scheduler
                    .enqueue(AdvanceTask::retry(claimed.id, claimed.current_step, claimed.step_attempts), retry_at)
                    .await?;

                let change = ExecutionChange {
                    current_step: claimed.current_step,
                    step_attempts: claimed.step_attempts,
                    status: ExecutionStatus::Active,
                    append: vec![self.outcome(claimed, failure(Some(retry_at)))],
                    completed_at: None,
                    failed_at: None,
                    failure_reason: None,
                };
                if self.commit(claimed, change).await?.is_none() {
                    return Ok(AdvanceOutcome::Stale);
                }
                warn!(
                    "step {} delivery attempt {}/{} failed, retrying at {}",
                    claimed.current_step, claimed.step_attempts, max_attempts, retry_at
                );
                Ok(AdvanceOutcome::DeliveryFailed { retry_at: Some(retry_at) })
            }
        }
    }

    async fn exhausted(&self, claimed: &ExecutionRecord, failure: OutcomeKind) -> Result<AdvanceOutcome, EngineError> {
        let delivery = self.outcome(claimed, failure);
        self.terminate(claimed, ALL_PROVIDERS_EXHAUSTED, vec![delivery]).await
    }

    // -----------------------------------------------------------------------
    // Terminal transitions
    // -----------------------------------------------------------------------

    async fn complete(&self, record: &ExecutionRecord) -> Result<AdvanceOutcome, EngineError> {
        let change = ExecutionChange {
            current_step: record.current_step,
            step_attempts: record.step_attempts,
            status: ExecutionStatus::Completed,
            append: Vec::new(),
            completed_at: Some(Utc::now()),
            failed_at: None,
            failure_reason: None,
        };
        if self.commit(record, change).await?.is_none() {
            return Ok(AdvanceOutcome::Stale);
        }
        info!("execution completed");
        self.sink.increment("sequence.completed", &[]);
        Ok(AdvanceOutcome::Completed)
    }

    async fn fail(&self, record: &ExecutionRecord, err: &EngineError) -> Result<AdvanceOutcome, EngineError> {
        error!("execution failed on step {}: {}", record.current_step, err);
        self.terminate(record, &err.failure_reason(), Vec::new()).await
    }

    async fn terminate(
        &self,
        record: &ExecutionRecord,
        reason: &str,
        mut append: Vec<StepOutcome>,
    ) -> Result<AdvanceOutcome, EngineError> {
        append.push(self.outcome(record, OutcomeKind::Failed { reason: reason.to_string() }));
        let change = ExecutionChange {
            current_step: record.current_step,
            step_attempts: record.step_attempts,
            status: ExecutionStatus::Failed,
            append,
            completed_at: None,
            failed_at: Some(Utc::now()),
            failure_reason: Some(reason.to_string()),
        };
        if self.commit(record, change).await?.is_none() {
            return Ok(AdvanceOutcome::Stale);
        }
        self.sink.increment("sequence.failed", &[("reason", reason)]);
        Ok(AdvanceOutcome::Failed { reason: reason.to_string() })
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Undo a claim after an error so the redelivered task can claim again.
    /// The send may already have happened; redelivery repeats it.
    async fn release(&self, claimed: &ExecutionRecord, previous_attempts: u32) {
        let change = ExecutionChange {
            current_step: claimed.current_step,
            step_attempts: previous_attempts,
            status: ExecutionStatus::Active,
            append: Vec::new(),
            completed_at: None,
            failed_at: None,
            failure_reason: None,
        };
        if let Err(err) = self.stores.executions.commit(claimed.id, StepGuard::of(claimed), change).await {
            error!("could not release claim on step {}: {}", claimed.current_step, err);
        }
    }

    /// Schedule the next step to run immediately, unless this is the last.
    async fn continue_now(&self, record: &ExecutionRecord) -> Result<(), EngineError> {
        let next = record.current_step + 1;
        if (next as usize) < record.steps.len() {
            self.scheduler.enqueue(AdvanceTask::at_step(record.id, next), Utc::now()).await?;
        }
        Ok(())
    }

    async fn commit(
        &self,
        record: &ExecutionRecord,
        change: ExecutionChange,
    ) -> Result<Option<ExecutionRecord>, EngineError> {
        let updated = self
            .stores
            .executions
            .commit(record.id, StepGuard::of(record), change)
            .await?;
        if updated.is_none() {
            debug!("lost compare-and-swap on step {}", record.current_step);
        }
        Ok(updated)
    }

    fn outcome(&self, record: &ExecutionRecord, kind: OutcomeKind) -> StepOutcome {
        StepOutcome { step: record.current_step, kind, at: Utc::now() }
    }
}

/// Move past the current step. Reaching the end completes the record in
/// the same write.
fn step_forward(record: &ExecutionRecord, append: Vec<StepOutcome>) -> ExecutionChange {
    let next = record.current_step + 1;
    let finished = next as usize >= record.steps.len();
    ExecutionChange {
        current_step: next,
        step_attempts: 0,
        status: if finished { ExecutionStatus::Completed } else { ExecutionStatus::Active },
        append,
        completed_at: finished.then(Utc::now),
        failed_at: None,
        failure_reason: None,
    }
}
