//! The `ProviderAdapter` trait: the contract every delivery backend must fulfil.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProviderError;

/// Delivery channel a provider serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Whatsapp,
    Email,
    Sms,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Whatsapp => "whatsapp",
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "whatsapp" => Ok(Self::Whatsapp),
            "email"    => Ok(Self::Email),
            "sms"      => Ok(Self::Sms),
            other      => Err(format!("unknown channel: {other}")),
        }
    }
}

/// A pre-approved template message (WhatsApp business templates and the like).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TemplateRef {
    pub name: String,
    /// Positional parameters, keyed by name so they can be personalised.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// One message addressed to one recipient, already personalised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub recipient: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<TemplateRef>,
}

impl OutboundMessage {
    pub fn text(recipient: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            body: body.into(),
            template: None,
        }
    }
}

/// Raw answer from a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub status_code: u16,
    pub body: Value,
}

impl ProviderResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Result of a lightweight health probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthProbe {
    pub healthy: bool,
    pub detail: Option<String>,
}

/// The core provider trait.
///
/// Adapters return `Ok` for any HTTP exchange that produced a response; the
/// gateway then asks [`ProviderAdapter::is_accepted`] whether the response
/// counts as a delivery. Connection problems, timeouts and undecodable
/// bodies are `Err`.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable name used in the delivery log.
    fn name(&self) -> &str;

    /// Channel this adapter delivers on.
    fn channel(&self) -> Channel;

    /// Send a single message.
    async fn send(&self, message: &OutboundMessage) -> Result<ProviderResponse, ProviderError>;

    /// Probe the backend without sending anything.
    async fn health_check(&self) -> Result<HealthProbe, ProviderError>;

    /// Whether `response` means the backend took the message.
    fn is_accepted(&self, response: &ProviderResponse) -> bool {
        response.is_success()
    }
}
