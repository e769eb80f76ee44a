//! `MockProvider`: a test double for `ProviderAdapter`.
//!
//! Useful in unit and integration tests where no real backend is reachable.
//! Each call pops the next scripted behaviour; once the script is empty the
//! fallback behaviour applies.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use crate::{Channel, HealthProbe, OutboundMessage, ProviderAdapter, ProviderError, ProviderResponse};

/// Behaviour injected into `MockProvider` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Answer 200 with a message id.
    Deliver,
    /// Answer with the given HTTP status.
    Status(u16),
    /// Fail with the given error.
    Fail(ProviderError),
    /// Sleep before delivering; used to trigger gateway timeouts.
    Hang(Duration),
}

/// A mock provider that records every message it receives.
#[derive(Clone)]
pub struct MockProvider {
    name: String,
    channel: Channel,
    healthy: bool,
    script: Arc<Mutex<VecDeque<MockBehaviour>>>,
    fallback: MockBehaviour,
    /// All messages seen by this provider (in call order).
    pub calls: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl MockProvider {
    fn with(name: impl Into<String>, channel: Channel, fallback: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            channel,
            healthy: true,
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A provider that always delivers.
    pub fn delivering(name: impl Into<String>, channel: Channel) -> Self {
        Self::with(name, channel, MockBehaviour::Deliver)
    }

    /// A provider that always answers with `status`.
    pub fn failing(name: impl Into<String>, channel: Channel, status: u16) -> Self {
        Self::with(name, channel, MockBehaviour::Status(status))
    }

    /// A provider that always fails with `err`.
    pub fn erroring(name: impl Into<String>, channel: Channel, err: ProviderError) -> Self {
        Self::with(name, channel, MockBehaviour::Fail(err))
    }

    /// Queue behaviours to be consumed before the fallback applies.
    pub fn then(self, behaviour: MockBehaviour) -> Self {
        self.script.lock().push_back(behaviour);
        self
    }

    /// Report unhealthy from `health_check`.
    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    /// Number of times `send` has been called.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn next_behaviour(&self) -> MockBehaviour {
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, message: &OutboundMessage) -> Result<ProviderResponse, ProviderError> {
        self.calls.lock().push(message.clone());
        let n = self.call_count();

        match self.next_behaviour() {
            MockBehaviour::Deliver => Ok(ProviderResponse {
                status_code: 200,
                body: json!({ "id": format!("{}-{n}", self.name), "status": "queued" }),
            }),
            MockBehaviour::Status(status) => Ok(ProviderResponse {
                status_code: status,
                body: json!({ "error": format!("mock status {status}") }),
            }),
            MockBehaviour::Fail(err) => Err(err),
            MockBehaviour::Hang(delay) => {
                tokio::time::sleep(delay).await;
                Ok(ProviderResponse {
                    status_code: 200,
                    body: json!({ "id": format!("{}-{n}", self.name) }),
                })
            }
        }
    }

    async fn health_check(&self) -> Result<HealthProbe, ProviderError> {
        Ok(HealthProbe {
            healthy: self.healthy,
            detail: (!self.healthy).then(|| "mock marked unhealthy".to_string()),
        })
    }
}
