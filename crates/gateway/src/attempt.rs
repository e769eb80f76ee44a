//! The delivery attempt record: one row per provider tried per send.

use chrono::{DateTime, Utc};
use providers::Channel;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Outcome of a single provider attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Delivered,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for AttemptStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delivered" => Ok(Self::Delivered),
            "failed"    => Ok(Self::Failed),
            other       => Err(format!("unknown attempt status: {other}")),
        }
    }
}

/// Who a send belongs to. Ad hoc sends leave everything `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptContext {
    pub execution_id: Option<Uuid>,
    /// The sequence (campaign) the execution runs.
    pub sequence_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
}

/// One logged try against one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub id: Uuid,
    #[serde(flatten)]
    pub context: AttemptContext,
    pub provider: String,
    pub channel: Channel,
    pub recipient: String,
    pub message: String,
    pub status: AttemptStatus,
    pub response_time_ms: u64,
    /// Raw response body, when the provider answered.
    pub provider_response: Option<Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DeliveryAttempt {
    pub fn is_delivered(&self) -> bool {
        self.status == AttemptStatus::Delivered
    }
}
