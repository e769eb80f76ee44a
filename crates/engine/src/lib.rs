//! `engine` crate — sequence domain models, validation, personalisation,
//! storage seams, the Sequence Engine, trigger resolution and the worker.

pub mod config;
pub mod error;
pub mod executor;
pub mod models;
pub mod personalize;
pub mod store;
pub mod trigger;
pub mod validate;
pub mod worker;

pub use config::{DeliveryFailurePolicy, EngineConfig};
pub use error::{EngineError, StoreError, ALL_PROVIDERS_EXHAUSTED, SEQUENCE_DEACTIVATED};
pub use executor::{AdvanceOutcome, EngineStores, SequenceEngine};
pub use models::{
    Customer, ExecutionRecord, ExecutionStatus, OutcomeKind, SequenceDefinition, StepDefinition, StepOutcome,
    TriggerType,
};
pub use store::{CustomerDirectory, ExecutionFilter, ExecutionStore, InMemoryStore, PgStore, SequenceStore};
pub use trigger::{StartSummary, TriggerFilter, TriggerService};
pub use validate::validate_sequence;
pub use worker::{Tick, Worker, WorkerConfig};

#[cfg(test)]
mod engine_tests;
