//! Core domain models for the sequence engine.
//!
//! These types are the source of truth for what a sequence and its
//! per-customer progress look like in memory. Steps and outcomes are
//! serialised to/from the JSONB columns of `sequences` and
//! `sequence_executions`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use providers::Channel;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// TriggerType
// ---------------------------------------------------------------------------

/// The business event a sequence is started by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Started by an operator; may start any sequence.
    Manual,
    NewCustomer,
    InactiveCustomer,
    Custom,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual           => "manual",
            Self::NewCustomer      => "new_customer",
            Self::InactiveCustomer => "inactive_customer",
            Self::Custom           => "custom",
        }
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TriggerType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual"            => Ok(Self::Manual),
            "new_customer"      => Ok(Self::NewCustomer),
            "inactive_customer" => Ok(Self::InactiveCustomer),
            "custom"            => Ok(Self::Custom),
            other               => Err(format!("unknown trigger type: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// StepDefinition
// ---------------------------------------------------------------------------

/// One unit of sequence work. Addressed only by its index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepDefinition {
    /// Wait before the next step. Realised by rescheduling, never by sleeping.
    Delay { hours: u32 },
    /// Personalise `content` and hand it to the delivery gateway.
    SendMessage {
        channel: Channel,
        #[serde(alias = "content_ref")]
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        template_name: Option<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        template_params: BTreeMap<String, String>,
    },
}

impl StepDefinition {
    pub fn delay(hours: u32) -> Self {
        Self::Delay { hours }
    }

    pub fn message(channel: Channel, content: impl Into<String>) -> Self {
        Self::SendMessage {
            channel,
            content: content.into(),
            template_name: None,
            template_params: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Delay { .. }       => "delay",
            Self::SendMessage { .. } => "send_message",
        }
    }
}

// ---------------------------------------------------------------------------
// SequenceDefinition
// ---------------------------------------------------------------------------

/// An ordered list of steps associated with a trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceDefinition {
    pub id: Uuid,
    pub name: String,
    pub trigger_type: TriggerType,
    pub steps: Vec<StepDefinition>,
    pub version: u32,
    /// Deactivated sequences fail their in-flight executions on next advance.
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl SequenceDefinition {
    /// A new, active definition at version 1.
    pub fn new(name: impl Into<String>, trigger_type: TriggerType, steps: Vec<StepDefinition>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            trigger_type,
            steps,
            version: 1,
            active: true,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Active,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active    => "active",
            Self::Completed => "completed",
            Self::Failed    => "failed",
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active"    => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "failed"    => Ok(Self::Failed),
            other       => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// What happened at one step invocation; appended to `execution_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Delay step: the next invocation was scheduled.
    Scheduled { delay_hours: u32, run_at: DateTime<Utc> },
    Sent {
        channel: Channel,
        recipient: String,
        provider: String,
        attempts: usize,
    },
    DeliveryFailed {
        channel: Channel,
        recipient: String,
        attempts: usize,
        error: Option<String>,
        /// Set when the retry policy rescheduled the step.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_at: Option<DateTime<Utc>>,
    },
    /// Warning outcome: the step was skipped without a delivery attempt.
    Skipped { channel: Channel, reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: u32,
    #[serde(flatten)]
    pub kind: OutcomeKind,
    pub at: DateTime<Utc>,
}

/// Progress of one customer through one sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub sequence_id: Uuid,
    pub customer_id: Uuid,
    /// 0-based; never decreases.
    pub current_step: u32,
    /// Claims made on `current_step`; reset when the step advances.
    pub step_attempts: u32,
    pub status: ExecutionStatus,
    /// Snapshot of the definition's steps at creation time.
    pub steps: Vec<StepDefinition>,
    pub execution_data: Vec<StepOutcome>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl ExecutionRecord {
    /// A fresh record at step 0 with the sequence's steps pinned.
    pub fn start(sequence: &SequenceDefinition, customer_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence_id: sequence.id,
            customer_id,
            current_step: 0,
            step_attempts: 0,
            status: ExecutionStatus::Active,
            steps: sequence.steps.clone(),
            execution_data: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
            failed_at: None,
            failure_reason: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ExecutionStatus::Active
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_step as usize >= self.steps.len()
    }
}

// ---------------------------------------------------------------------------
// Customer
// ---------------------------------------------------------------------------

/// A customer as seen by triggers and personalisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Custom fields usable as `{{key}}` placeholders.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl Customer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            phone: None,
            email: None,
            tags: Vec::new(),
            attributes: BTreeMap::new(),
            created_at: Utc::now(),
            last_activity_at: None,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// The contact address for `channel`, if the customer has a non-blank one.
    pub fn address(&self, channel: Channel) -> Option<&str> {
        let raw = match channel {
            Channel::Whatsapp | Channel::Sms => self.phone.as_deref(),
            Channel::Email => self.email.as_deref(),
        };
        raw.map(str::trim).filter(|a| !a.is_empty())
    }
}
