//! Scenario tests for the sequence engine.
//!
//! Everything runs against `InMemoryStore`, `InMemoryQueue` and
//! `MockProvider`, so no Postgres or network is required.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gateway::{AttemptStatus, DeliveryGateway, InMemoryDeliveryLog, RecordingSink};
use providers::mock::{MockBehaviour, MockProvider};
use providers::Channel;
use queue::{AdvanceTask, InMemoryQueue, JobSource, Scheduler};

use crate::store::{ExecutionStore, SequenceStore};
use crate::{
    AdvanceOutcome, Customer, DeliveryFailurePolicy, EngineConfig, EngineError, EngineStores, ExecutionRecord,
    ExecutionStatus, InMemoryStore, OutcomeKind, SequenceDefinition, SequenceEngine, StepDefinition, Tick,
    TriggerFilter, TriggerService, TriggerType, Worker, WorkerConfig, ALL_PROVIDERS_EXHAUSTED,
    SEQUENCE_DEACTIVATED,
};

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    store: Arc<InMemoryStore>,
    queue: Arc<InMemoryQueue>,
    log: Arc<InMemoryDeliveryLog>,
    sink: Arc<RecordingSink>,
    engine: Arc<SequenceEngine>,
}

fn harness(providers: Vec<MockProvider>, policy: DeliveryFailurePolicy) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let queue = Arc::new(InMemoryQueue::new());
    let log = Arc::new(InMemoryDeliveryLog::new());
    let sink = Arc::new(RecordingSink::new());

    let mut builder = DeliveryGateway::builder(log.clone())
        .sink(sink.clone())
        .bulk_delay(Duration::ZERO)
        .default_timeout(Duration::from_secs(5));
    for p in providers {
        builder = builder.provider(Arc::new(p)).expect("unique provider names");
    }

    let engine = Arc::new(SequenceEngine::new(
        EngineStores::shared(store.clone()),
        Arc::new(builder.build()),
        queue.clone(),
        sink.clone(),
        EngineConfig { delivery_failure: policy },
    ));
    Harness { store, queue, log, sink, engine }
}

fn siti() -> Customer {
    Customer::new("Siti Rahma").with_phone("+628123456789").with_email("siti@example.com")
}

impl Harness {
    async fn enroll(&self, steps: Vec<StepDefinition>, customer: Customer) -> ExecutionRecord {
        let sequence = SequenceDefinition::new("test", TriggerType::Manual, steps);
        self.store.create_sequence(&sequence).await.unwrap();
        let record = ExecutionRecord::start(&sequence, customer.id);
        self.store.insert_customer(customer);
        self.store.create_execution(&record).await.unwrap();
        record
    }

    async fn reload(&self, id: uuid::Uuid) -> ExecutionRecord {
        self.store.get_execution(id).await.unwrap().expect("record exists")
    }

    fn worker(&self) -> Worker {
        let config = WorkerConfig { retry_base_ms: 0, ..Default::default() };
        Worker::new(self.queue.clone(), self.engine.clone(), config)
    }
}

/// Run the worker until nothing is due; returns the ticks it processed.
async fn drain(worker: &Worker) -> Vec<Tick> {
    let mut ticks = Vec::new();
    loop {
        match worker.run_once().await.unwrap() {
            Tick::Idle => return ticks,
            tick => ticks.push(tick),
        }
    }
}

fn three_messages() -> Vec<StepDefinition> {
    vec![
        StepDefinition::message(Channel::Whatsapp, "Hi {{first_name}}"),
        StepDefinition::message(Channel::Whatsapp, "Second"),
        StepDefinition::message(Channel::Email, "Third for {{email}}"),
    ]
}

// ============================================================
// Happy path
// ============================================================

#[tokio::test]
async fn all_sends_succeeding_completes_after_exactly_n_invocations() {
    let wa = MockProvider::delivering("meta", Channel::Whatsapp);
    let mail = MockProvider::delivering("relay", Channel::Email);
    let h = harness(vec![wa.clone(), mail.clone()], DeliveryFailurePolicy::Stall);
    let record = h.enroll(three_messages(), siti()).await;

    let first = h.engine.advance(AdvanceTask::at_step(record.id, 0)).await.unwrap();
    assert_eq!(first, AdvanceOutcome::Sent { provider: "meta".into() });
    let rest = drain(&h.worker()).await;

    assert_eq!(1 + rest.len(), 3);
    let done = h.reload(record.id).await;
    assert_eq!(done.status, ExecutionStatus::Completed);
    assert_eq!(done.current_step, 3);
    assert!(done.completed_at.is_some());
    assert_eq!(done.execution_data.len(), 3);

    assert_eq!(wa.calls.lock()[0].body, "Hi Siti");
    assert_eq!(mail.calls.lock()[0].body, "Third for siti@example.com");
    assert_eq!(h.log.len(), 3);
    assert!(h.log.attempts().iter().all(|a| a.context.execution_id == Some(record.id)));
    assert_eq!(h.queue.pending_count(), 0);
}

#[tokio::test]
async fn empty_sequence_completes_on_first_advance() {
    let h = harness(vec![], DeliveryFailurePolicy::Stall);
    let record = h.enroll(vec![], siti()).await;

    let outcome = h.engine.advance(AdvanceTask::at_step(record.id, 0)).await.unwrap();
    assert_eq!(outcome, AdvanceOutcome::Completed);
    assert_eq!(h.reload(record.id).await.status, ExecutionStatus::Completed);
    assert_eq!(h.sink.count("sequence.completed", None), 1);
}

// ============================================================
// Delay steps
// ============================================================

#[tokio::test]
async fn delay_schedules_one_reinvocation_and_never_sends() {
    let wa = MockProvider::delivering("meta", Channel::Whatsapp);
    let h = harness(vec![wa.clone()], DeliveryFailurePolicy::Stall);
    let record = h
        .enroll(vec![StepDefinition::delay(24), StepDefinition::message(Channel::Whatsapp, "later")], siti())
        .await;

    let before = Utc::now();
    let outcome = h.engine.advance(AdvanceTask::at_step(record.id, 0)).await.unwrap();

    let AdvanceOutcome::Scheduled { run_at } = outcome else {
        panic!("expected Scheduled, got {outcome:?}");
    };
    let expected = before + chrono::Duration::hours(24);
    assert!((run_at - expected).num_seconds().abs() <= 5);

    assert_eq!(wa.call_count(), 0);
    assert!(h.log.is_empty());

    let pending = h.queue.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].0, AdvanceTask::at_step(record.id, 1));
    assert_eq!(pending[0].1, run_at);

    let after = h.reload(record.id).await;
    assert_eq!(after.current_step, 1);
    assert_eq!(after.status, ExecutionStatus::Active);
    assert!(matches!(after.execution_data[0].kind, OutcomeKind::Scheduled { delay_hours: 24, .. }));

    // Not due yet: the worker finds nothing.
    assert!(drain(&h.worker()).await.is_empty());
}

// ============================================================
// Delivery failure policies
// ============================================================

#[tokio::test]
async fn delivery_failure_stalls_the_record_by_default() {
    let h = harness(
        vec![
            MockProvider::failing("meta", Channel::Whatsapp, 503),
            MockProvider::failing("twilio", Channel::Whatsapp, 500),
        ],
        DeliveryFailurePolicy::Stall,
    );
    let record = h.enroll(three_messages(), siti()).await;

    let outcome = h.engine.advance(AdvanceTask::at_step(record.id, 0)).await.unwrap();
    assert_eq!(outcome, AdvanceOutcome::DeliveryFailed { retry_at: None });

    let after = h.reload(record.id).await;
    assert_eq!(after.current_step, 1);
    assert_eq!(after.status, ExecutionStatus::Active);
    assert_eq!(h.queue.pending_count(), 0);
    assert_eq!(h.log.len(), 2);
    assert!(h.log.attempts().iter().all(|a| a.status == AttemptStatus::Failed));
    match &after.execution_data[0].kind {
        OutcomeKind::DeliveryFailed { attempts, error, .. } => {
            assert_eq!(*attempts, 2);
            assert!(error.is_some());
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn fail_policy_marks_all_providers_exhausted() {
    let h = harness(vec![MockProvider::failing("meta", Channel::Whatsapp, 500)], DeliveryFailurePolicy::Fail);
    let record = h.enroll(three_messages(), siti()).await;

    let outcome = h.engine.advance(AdvanceTask::at_step(record.id, 0)).await.unwrap();
    assert_eq!(outcome, AdvanceOutcome::Failed { reason: ALL_PROVIDERS_EXHAUSTED.into() });

    let after = h.reload(record.id).await;
    assert_eq!(after.status, ExecutionStatus::Failed);
    assert_eq!(after.current_step, 0);
    assert_eq!(after.failure_reason.as_deref(), Some(ALL_PROVIDERS_EXHAUSTED));
    assert!(after.failed_at.is_some());
    assert_eq!(h.sink.count("sequence.failed", Some(("reason", ALL_PROVIDERS_EXHAUSTED))), 1);
}

#[tokio::test]
async fn retry_policy_backs_off_then_fails() {
    let meta = MockProvider::failing("meta", Channel::Whatsapp, 500);
    let h = harness(vec![meta.clone()], DeliveryFailurePolicy::retry(2, 60, 600));
    let record = h.enroll(three_messages(), siti()).await;

    let outcome = h.engine.advance(AdvanceTask::at_step(record.id, 0)).await.unwrap();
    let AdvanceOutcome::DeliveryFailed { retry_at: Some(retry_at) } = outcome else {
        panic!("expected a rescheduled failure, got {outcome:?}");
    };
    assert!(retry_at > Utc::now() + chrono::Duration::seconds(50));

    let after = h.reload(record.id).await;
    assert_eq!((after.current_step, after.step_attempts), (0, 1));
    let (task, at) = h.queue.drain_pending().pop().expect("retry scheduled");
    assert_eq!(task, AdvanceTask::retry(record.id, 0, 1));
    assert_eq!(at, retry_at);

    let second = h.engine.advance(task).await.unwrap();
    assert_eq!(second, AdvanceOutcome::Failed { reason: ALL_PROVIDERS_EXHAUSTED.into() });
    assert_eq!(meta.call_count(), 2);
    assert_eq!(h.reload(record.id).await.status, ExecutionStatus::Failed);
}

#[tokio::test]
async fn retry_policy_recovers_when_a_later_try_succeeds() {
    let meta = MockProvider::delivering("meta", Channel::Whatsapp).then(MockBehaviour::Status(502));
    let h = harness(vec![meta.clone()], DeliveryFailurePolicy::retry(3, 1, 10));
    let record = h.enroll(three_messages(), siti()).await;

    h.engine.advance(AdvanceTask::at_step(record.id, 0)).await.unwrap();
    let (task, _) = h.queue.drain_pending().pop().expect("retry scheduled");
    let outcome = h.engine.advance(task).await.unwrap();

    assert_eq!(outcome, AdvanceOutcome::Sent { provider: "meta".into() });
    let after = h.reload(record.id).await;
    assert_eq!((after.current_step, after.step_attempts), (1, 0));
    let pending = h.queue.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].0, AdvanceTask::at_step(record.id, 1));
}

// ============================================================
// Concurrency guard
// ============================================================

#[tokio::test(start_paused = true)]
async fn duplicate_concurrent_tasks_advance_at_most_one_step() {
    let slow = MockProvider::delivering("meta", Channel::Whatsapp).then(MockBehaviour::Hang(Duration::from_millis(200)));
    let h = harness(vec![slow.clone()], DeliveryFailurePolicy::Stall);
    let record = h.enroll(three_messages(), siti()).await;

    let task = AdvanceTask::at_step(record.id, 0);
    let (a, b) = tokio::join!(h.engine.advance(task), h.engine.advance(task));
    let outcomes = [a.unwrap(), b.unwrap()];

    assert_eq!(outcomes.iter().filter(|o| **o == AdvanceOutcome::Stale).count(), 1);
    assert_eq!(slow.call_count(), 1);
    let after = h.reload(record.id).await;
    assert_eq!(after.current_step, 1);
    assert_eq!(after.execution_data.len(), 1);
}

#[tokio::test]
async fn redelivered_task_after_success_is_a_no_op() {
    let wa = MockProvider::delivering("meta", Channel::Whatsapp);
    let h = harness(vec![wa.clone()], DeliveryFailurePolicy::Stall);
    let record = h.enroll(three_messages(), siti()).await;

    let task = AdvanceTask::at_step(record.id, 0);
    h.engine.advance(task).await.unwrap();
    assert_eq!(h.engine.advance(task).await.unwrap(), AdvanceOutcome::Stale);
    assert_eq!(wa.call_count(), 1);
    assert_eq!(h.reload(record.id).await.current_step, 1);
}

#[tokio::test]
async fn finished_records_ignore_further_tasks() {
    let h = harness(vec![MockProvider::failing("meta", Channel::Whatsapp, 500)], DeliveryFailurePolicy::Fail);
    let record = h.enroll(three_messages(), siti()).await;
    h.engine.advance(AdvanceTask::at_step(record.id, 0)).await.unwrap();

    assert_eq!(h.engine.advance(AdvanceTask::at_step(record.id, 0)).await.unwrap(), AdvanceOutcome::NotActive);
}

// ============================================================
// Input and engine-fatal errors
// ============================================================

#[tokio::test]
async fn missing_address_skips_and_continues_immediately() {
    let wa = MockProvider::delivering("meta", Channel::Whatsapp);
    let h = harness(vec![wa.clone()], DeliveryFailurePolicy::Stall);
    let customer = Customer::new("No Phone").with_email("np@example.com");
    let record = h.enroll(three_messages(), customer).await;

    let outcome = h.engine.advance(AdvanceTask::at_step(record.id, 0)).await.unwrap();
    assert_eq!(outcome, AdvanceOutcome::Skipped { reason: "missing_address".into() });
    assert_eq!(wa.call_count(), 0);
    assert!(h.log.is_empty());

    let after = h.reload(record.id).await;
    assert_eq!(after.current_step, 1);
    assert!(matches!(after.execution_data[0].kind, OutcomeKind::Skipped { .. }));
    assert_eq!(h.queue.pending()[0].0, AdvanceTask::at_step(record.id, 1));
}

#[tokio::test]
async fn invalid_address_is_skipped_without_attempts() {
    let h = harness(vec![MockProvider::delivering("meta", Channel::Whatsapp)], DeliveryFailurePolicy::Stall);
    let record = h.enroll(three_messages(), Customer::new("Typo").with_phone("12")).await;

    let outcome = h.engine.advance(AdvanceTask::at_step(record.id, 0)).await.unwrap();
    assert_eq!(outcome, AdvanceOutcome::Skipped { reason: "invalid_recipient".into() });
    let after = h.reload(record.id).await;
    assert_eq!((after.current_step, after.step_attempts), (1, 0));
}

#[tokio::test]
async fn missing_sequence_definition_fails_the_record() {
    let h = harness(vec![], DeliveryFailurePolicy::Stall);
    let customer = siti();
    let orphan = SequenceDefinition::new("never stored", TriggerType::Manual, three_messages());
    let record = ExecutionRecord::start(&orphan, customer.id);
    h.store.insert_customer(customer);
    h.store.create_execution(&record).await.unwrap();

    let outcome = h.engine.advance(AdvanceTask::at_step(record.id, 0)).await.unwrap();
    assert!(matches!(outcome, AdvanceOutcome::Failed { .. }));
    let after = h.reload(record.id).await;
    assert_eq!(after.status, ExecutionStatus::Failed);
    assert!(after.failure_reason.as_deref().is_some_and(|r| r.contains("not found")));
}

#[tokio::test]
async fn deactivated_sequence_fails_in_flight_records() {
    let wa = MockProvider::delivering("meta", Channel::Whatsapp);
    let h = harness(vec![wa.clone()], DeliveryFailurePolicy::Stall);
    let record = h.enroll(three_messages(), siti()).await;
    h.store.set_active(record.sequence_id, false).await.unwrap();

    let outcome = h.engine.advance(AdvanceTask::at_step(record.id, 0)).await.unwrap();
    assert_eq!(outcome, AdvanceOutcome::Failed { reason: SEQUENCE_DEACTIVATED.into() });
    assert_eq!(wa.call_count(), 0);
}

#[tokio::test]
async fn missing_customer_fails_the_record() {
    let h = harness(vec![MockProvider::delivering("meta", Channel::Whatsapp)], DeliveryFailurePolicy::Stall);
    let customer = siti();
    let id = customer.id;
    let record = h.enroll(three_messages(), customer).await;
    h.store.remove_customer(id);

    let outcome = h.engine.advance(AdvanceTask::at_step(record.id, 0)).await.unwrap();
    assert!(matches!(outcome, AdvanceOutcome::Failed { .. }));
}

#[tokio::test]
async fn malformed_snapshotted_step_fails_the_record() {
    let h = harness(vec![MockProvider::delivering("meta", Channel::Whatsapp)], DeliveryFailurePolicy::Stall);
    let record = h.enroll(vec![StepDefinition::message(Channel::Whatsapp, "   ")], siti()).await;

    let outcome = h.engine.advance(AdvanceTask::at_step(record.id, 0)).await.unwrap();
    let AdvanceOutcome::Failed { reason } = outcome else {
        panic!("expected Failed, got {outcome:?}");
    };
    assert!(reason.contains("malformed"));
}

#[tokio::test]
async fn unknown_execution_is_an_error_not_a_failure() {
    let h = harness(vec![], DeliveryFailurePolicy::Stall);
    let err = h.engine.advance(AdvanceTask::at_step(uuid::Uuid::new_v4(), 0)).await.unwrap_err();
    assert!(matches!(err, EngineError::ExecutionNotFound(_)));
    assert!(!err.is_transient());
}

// ============================================================
// Queue interaction
// ============================================================

#[tokio::test]
async fn enqueue_failure_releases_the_claim_for_redelivery() {
    let wa = MockProvider::delivering("meta", Channel::Whatsapp);
    let h = harness(vec![wa.clone()], DeliveryFailurePolicy::Stall);
    let record = h.enroll(three_messages(), siti()).await;
    h.queue.enqueue(AdvanceTask::at_step(record.id, 0), Utc::now()).await.unwrap();

    h.queue.fail_next_enqueues(1);
    let worker = h.worker();
    assert_eq!(worker.run_once().await.unwrap(), Tick::Retried);

    let after = h.reload(record.id).await;
    assert_eq!((after.current_step, after.step_attempts), (0, 0));

    // Redelivery of the same job re-sends and continues.
    let tick = worker.run_once().await.unwrap();
    assert_eq!(tick, Tick::Processed(AdvanceOutcome::Sent { provider: "meta".into() }));
    assert_eq!(wa.call_count(), 2);
    assert_eq!(h.reload(record.id).await.current_step, 1);
}

#[tokio::test]
async fn worker_drops_jobs_for_unknown_executions() {
    let h = harness(vec![], DeliveryFailurePolicy::Stall);
    h.queue.enqueue(AdvanceTask::at_step(uuid::Uuid::new_v4(), 0), Utc::now()).await.unwrap();

    assert_eq!(h.worker().run_once().await.unwrap(), Tick::Dropped);
    assert_eq!(h.queue.completed_count(), 1);
}

#[tokio::test]
async fn worker_picks_up_a_job_whose_claim_was_abandoned() {
    let wa = MockProvider::delivering("meta", Channel::Whatsapp);
    let h = harness(vec![wa.clone()], DeliveryFailurePolicy::Stall);
    let record = h.enroll(three_messages(), siti()).await;
    let earlier = Utc::now() - chrono::Duration::seconds(2);
    h.queue.enqueue(AdvanceTask::at_step(record.id, 0), earlier).await.unwrap();
    // Claimed by a worker that died before settling it.
    h.queue.claim_due(earlier).await.unwrap().expect("claimable");

    assert_eq!(h.worker().run_once().await.unwrap(), Tick::Idle);

    let config = WorkerConfig { retry_base_ms: 0, lease_ms: 0, ..Default::default() };
    let worker = Worker::new(h.queue.clone(), h.engine.clone(), config);
    let tick = worker.run_once().await.unwrap();
    assert_eq!(tick, Tick::Processed(AdvanceOutcome::Sent { provider: "meta".into() }));
    assert_eq!(wa.call_count(), 1);
    assert_eq!(h.reload(record.id).await.current_step, 1);
    assert_eq!(h.queue.in_flight_count(), 0);
}

#[tokio::test]
async fn worker_stops_on_shutdown() {
    let h = harness(vec![], DeliveryFailurePolicy::Stall);
    let worker = h.worker();
    let (tx, rx) = tokio::sync::watch::channel(false);

    let handle = tokio::spawn(async move { worker.run(rx).await });
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle).await.expect("worker exits").unwrap();
}

// ============================================================
// Trigger resolution
// ============================================================

#[tokio::test]
async fn manual_trigger_starts_each_customer_once() {
    let wa = MockProvider::delivering("meta", Channel::Whatsapp);
    let h = harness(vec![wa.clone()], DeliveryFailurePolicy::Stall);
    let sequence = SequenceDefinition::new("welcome", TriggerType::NewCustomer, three_messages());
    h.store.create_sequence(&sequence).await.unwrap();
    let (a, b) = (siti(), Customer::new("Budi").with_phone("+628987654321"));
    h.store.insert_customer(a.clone());
    h.store.insert_customer(b.clone());

    let triggers = TriggerService::new(h.engine.clone());
    let filter = TriggerFilter::customers(vec![a.id, b.id]);
    let summary = triggers.start_sequence(sequence.id, TriggerType::Manual, &filter).await.unwrap();

    assert_eq!((summary.matched, summary.started, summary.skipped_existing), (2, 2, 0));
    assert_eq!(wa.call_count(), 2);
    for id in &summary.execution_ids {
        let record = h.reload(*id).await;
        assert_eq!(record.current_step, 1);
        assert_eq!(record.steps, sequence.steps);
    }

    let again = triggers.start_sequence(sequence.id, TriggerType::Manual, &filter).await.unwrap();
    assert_eq!((again.started, again.skipped_existing), (0, 2));
}

#[tokio::test]
async fn trigger_fallback_job_runs_its_first_step_once_when_redelivered() {
    let wa = MockProvider::delivering("meta", Channel::Whatsapp);
    let h = harness(vec![wa.clone()], DeliveryFailurePolicy::Stall);
    let steps = vec![StepDefinition::delay(24), StepDefinition::message(Channel::Whatsapp, "Hi {{first_name}}")];
    let sequence = SequenceDefinition::new("nurture", TriggerType::Manual, steps);
    h.store.create_sequence(&sequence).await.unwrap();
    let customer = siti();
    h.store.insert_customer(customer.clone());

    // The delay's continuation fails to enqueue, so the trigger queues step 0.
    h.queue.fail_next_enqueues(1);
    let summary = TriggerService::new(h.engine.clone())
        .start_sequence(sequence.id, TriggerType::Manual, &TriggerFilter::customers(vec![customer.id]))
        .await
        .unwrap();
    let id = summary.execution_ids[0];
    let (queued, _) = h.queue.drain_pending().pop().expect("first step queued");
    assert_eq!(queued, AdvanceTask::at_step(id, 0));

    let first = h.engine.advance(queued).await.unwrap();
    assert!(matches!(first, AdvanceOutcome::Scheduled { .. }));
    assert_eq!(h.engine.advance(queued).await.unwrap(), AdvanceOutcome::Stale);

    assert_eq!(wa.call_count(), 0);
    let after = h.reload(id).await;
    assert_eq!((after.current_step, after.status), (1, ExecutionStatus::Active));
    let pending = h.queue.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].0, AdvanceTask::at_step(id, 1));
    assert!(pending[0].1 > Utc::now() + chrono::Duration::hours(23));
}

#[tokio::test]
async fn non_manual_trigger_must_match_the_sequence() {
    let h = harness(vec![], DeliveryFailurePolicy::Stall);
    let sequence = SequenceDefinition::new("winback", TriggerType::InactiveCustomer, three_messages());
    h.store.create_sequence(&sequence).await.unwrap();

    let triggers = TriggerService::new(h.engine.clone());
    let err = triggers
        .start_sequence(sequence.id, TriggerType::NewCustomer, &TriggerFilter::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::TriggerMismatch { .. }));
}

#[tokio::test]
async fn new_customer_trigger_only_picks_recent_customers() {
    let h = harness(vec![MockProvider::delivering("meta", Channel::Whatsapp)], DeliveryFailurePolicy::Stall);
    let sequence = SequenceDefinition::new("welcome", TriggerType::NewCustomer, vec![StepDefinition::delay(1)]);
    h.store.create_sequence(&sequence).await.unwrap();

    let fresh = siti();
    let mut old = Customer::new("Old Timer").with_phone("+628111111111");
    old.created_at = Utc::now() - chrono::Duration::days(10);
    h.store.insert_customer(fresh.clone());
    h.store.insert_customer(old);

    let summary = TriggerService::new(h.engine.clone())
        .start_sequence(sequence.id, TriggerType::NewCustomer, &TriggerFilter::default())
        .await
        .unwrap();
    assert_eq!(summary.matched, 1);
    assert_eq!(h.reload(summary.execution_ids[0]).await.customer_id, fresh.id);
}

#[tokio::test]
async fn deactivated_sequence_cannot_be_started() {
    let h = harness(vec![], DeliveryFailurePolicy::Stall);
    let sequence = SequenceDefinition::new("off", TriggerType::Manual, three_messages());
    h.store.create_sequence(&sequence).await.unwrap();
    h.store.set_active(sequence.id, false).await.unwrap();

    let err = TriggerService::new(h.engine.clone())
        .start_sequence(sequence.id, TriggerType::Manual, &TriggerFilter::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SequenceDeactivated(_)));
}
