//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

use crate::TriggerType;

/// Failure reason recorded when every provider failed on a message step.
pub const ALL_PROVIDERS_EXHAUSTED: &str = "all_providers_exhausted";
/// Failure reason recorded when the definition was deactivated mid-flight.
pub const SEQUENCE_DEACTIVATED: &str = "sequence_deactivated";

/// Errors from the engine's storage seams.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    /// A persisted row no longer decodes into its domain type.
    #[error("cannot decode {entity} {id}: {message}")]
    Decode {
        entity: &'static str,
        id: Uuid,
        message: String,
    },

    #[error("{entity} {id} already exists")]
    Duplicate { entity: &'static str, id: Uuid },
}

/// Errors produced by the sequence engine (validation + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors ------

    #[error("sequence name must not be empty")]
    EmptyName,

    #[error("sequence has no steps")]
    NoSteps,

    /// A step definition cannot be executed as written.
    #[error("step {index} is malformed: {message}")]
    MalformedStep { index: usize, message: String },

    // ------ Execution errors ------

    #[error("execution {0} not found")]
    ExecutionNotFound(Uuid),

    #[error("sequence {0} not found")]
    SequenceNotFound(Uuid),

    #[error("sequence {0} is deactivated")]
    SequenceDeactivated(Uuid),

    #[error("customer {0} not found")]
    CustomerNotFound(Uuid),

    /// A non-manual trigger tried to start a sequence bound to another trigger.
    #[error("sequence is triggered by '{expected}', not '{requested}'")]
    TriggerMismatch {
        expected: TriggerType,
        requested: TriggerType,
    },

    // ------ Infrastructure errors ------

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("queue error: {0}")]
    Queue(#[from] queue::QueueError),
}

impl EngineError {
    /// Whether this error, raised while advancing, moves the record to
    /// `failed`. Everything else propagates so the job is redelivered.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SequenceNotFound(_)
                | Self::SequenceDeactivated(_)
                | Self::CustomerNotFound(_)
                | Self::MalformedStep { .. }
        )
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Queue(_))
    }

    /// Text stored in `failure_reason`.
    pub fn failure_reason(&self) -> String {
        match self {
            Self::SequenceDeactivated(_) => SEQUENCE_DEACTIVATED.to_string(),
            other => other.to_string(),
        }
    }
}
