//! `[engine]` configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for the sequence engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub delivery_failure: DeliveryFailurePolicy,
}

/// What a message step does when every provider failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DeliveryFailurePolicy {
    /// Advance past the step and schedule nothing. The record stays
    /// `active` with no further work until someone intervenes.
    #[default]
    Stall,
    /// Mark the record `failed` with `all_providers_exhausted`.
    Fail,
    /// Keep the step and try again with exponential back-off; fail the
    /// record once `max_attempts` sends have been made.
    Retry {
        #[serde(default = "default_max_attempts")]
        max_attempts: u32,
        #[serde(default = "default_base_delay_secs")]
        base_delay_secs: u64,
        #[serde(default = "default_max_delay_secs")]
        max_delay_secs: u64,
    },
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_secs() -> u64 {
    300
}

fn default_max_delay_secs() -> u64 {
    6 * 3600
}

impl DeliveryFailurePolicy {
    pub fn retry(max_attempts: u32, base_delay_secs: u64, max_delay_secs: u64) -> Self {
        Self::Retry { max_attempts, base_delay_secs, max_delay_secs }
    }

    /// Back-off before the next try after `attempt` failed sends (1-based).
    pub fn backoff(base_delay_secs: u64, max_delay_secs: u64, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_secs(base_delay_secs.saturating_mul(factor).min(max_delay_secs))
    }
}
