//! Delivery Gateway: priority-ordered failover across provider adapters.
//!
//! `DeliveryGateway::send`:
//! 1. Validates and normalises the recipient for the channel.
//! 2. Walks the channel's providers in configured order.
//! 3. Logs a `DeliveryAttempt` for every provider tried, success or not.
//! 4. Stops at the first provider that accepts the message.
//!
//! Failure is a value (`DeliveryReport::success == false`), never an error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use providers::recipient::{is_valid_address, normalize_phone};
use providers::{Channel, OutboundMessage, ProviderAdapter, ProviderConfig, ProviderError, RateLimit, TemplateRef};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::attempt::{AttemptContext, AttemptStatus, DeliveryAttempt};
use crate::log::DeliveryLogStore;
use crate::rate_limit::TokenBucket;
use crate::sink::{MetricsSink, TracingSink};
use crate::GatewayError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// `[gateway]` section of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Pause between recipients in `bulk_send`.
    #[serde(default = "default_bulk_delay_ms")]
    pub bulk_delay_ms: u64,
    /// Per-provider timeout when an entry doesn't set its own.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Replaces a leading `0` in national phone numbers.
    #[serde(default)]
    pub default_country_code: Option<String>,
    /// Failover order is list order.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

fn default_bulk_delay_ms() -> u64 {
    1000
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bulk_delay_ms: default_bulk_delay_ms(),
            default_timeout_ms: default_timeout_ms(),
            default_country_code: None,
            providers: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests and reports
// ---------------------------------------------------------------------------

/// One logical send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub recipient: String,
    pub message: String,
    pub channel: Channel,
    #[serde(default)]
    pub template: Option<TemplateRef>,
    #[serde(default)]
    pub context: AttemptContext,
}

impl DeliveryRequest {
    pub fn new(channel: Channel, recipient: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            message: message.into(),
            channel,
            template: None,
            context: AttemptContext::default(),
        }
    }
}

/// Result of [`DeliveryGateway::send`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub success: bool,
    pub provider_used: Option<String>,
    /// Every provider tried, in priority order.
    pub attempts: Vec<DeliveryAttempt>,
    /// Why the request was refused before any provider was tried.
    pub rejected: Option<String>,
}

impl DeliveryReport {
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            provider_used: None,
            attempts: Vec::new(),
            rejected: Some(reason.into()),
        }
    }

    /// Last error message across the attempts, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.attempts
            .iter()
            .rev()
            .find_map(|a| a.error_message.as_deref())
            .or(self.rejected.as_deref())
    }
}

/// Per-recipient outcome of a bulk send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BulkOutcome {
    Sent { provider: String },
    Failed { error: Option<String> },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkResult {
    pub recipient: String,
    #[serde(flatten)]
    pub outcome: BulkOutcome,
}

/// Aggregate result of [`DeliveryGateway::bulk_send`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkSummary {
    pub total: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// Recipients without a usable address; never sent.
    pub skipped_count: usize,
    pub results: Vec<BulkResult>,
}

/// Observational health of one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub name: String,
    pub channel: Channel,
    /// 1-based position within the channel's failover list.
    pub priority: usize,
    pub healthy: bool,
    pub latency_ms: u64,
    pub detail: Option<String>,
}

// ---------------------------------------------------------------------------
// DeliveryGateway
// ---------------------------------------------------------------------------

struct RegisteredProvider {
    adapter: Arc<dyn ProviderAdapter>,
    timeout: Duration,
    limiter: Option<TokenBucket>,
}

/// Owns the provider list and the delivery log.
pub struct DeliveryGateway {
    providers: Vec<RegisteredProvider>,
    log: Arc<dyn DeliveryLogStore>,
    sink: Arc<dyn MetricsSink>,
    bulk_delay: Duration,
    default_timeout: Duration,
    default_country_code: Option<String>,
}

/// Builder for [`DeliveryGateway`].
pub struct GatewayBuilder {
    providers: Vec<RegisteredProvider>,
    log: Arc<dyn DeliveryLogStore>,
    sink: Arc<dyn MetricsSink>,
    bulk_delay: Duration,
    default_timeout: Duration,
    default_country_code: Option<String>,
}

impl GatewayBuilder {
    /// Append a provider at the lowest priority so far.
    pub fn provider(self, adapter: Arc<dyn ProviderAdapter>) -> Result<Self, GatewayError> {
        let timeout = self.default_timeout;
        self.provider_with(adapter, timeout, None)
    }

    /// Append a provider with its own timeout and optional rate limit.
    pub fn provider_with(
        mut self,
        adapter: Arc<dyn ProviderAdapter>,
        timeout: Duration,
        rate_limit: Option<RateLimit>,
    ) -> Result<Self, GatewayError> {
        if self.providers.iter().any(|p| p.adapter.name() == adapter.name()) {
            return Err(GatewayError::DuplicateProvider { name: adapter.name().to_string() });
        }
        let limiter = rate_limit
            .map(|r| TokenBucket::new(r.per_second, r.burst))
            .transpose()?;
        self.providers.push(RegisteredProvider { adapter, timeout, limiter });
        Ok(self)
    }

    pub fn sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn bulk_delay(mut self, delay: Duration) -> Self {
        self.bulk_delay = delay;
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn default_country_code(mut self, code: Option<String>) -> Self {
        self.default_country_code = code;
        self
    }

    pub fn build(self) -> DeliveryGateway {
        DeliveryGateway {
            providers: self.providers,
            log: self.log,
            sink: self.sink,
            bulk_delay: self.bulk_delay,
            default_timeout: self.default_timeout,
            default_country_code: self.default_country_code,
        }
    }
}

impl DeliveryGateway {
    pub fn builder(log: Arc<dyn DeliveryLogStore>) -> GatewayBuilder {
        GatewayBuilder {
            providers: Vec::new(),
            log,
            sink: Arc::new(TracingSink),
            bulk_delay: Duration::from_millis(default_bulk_delay_ms()),
            default_timeout: Duration::from_millis(default_timeout_ms()),
            default_country_code: None,
        }
    }

    /// Build the gateway and every adapter described by `config`.
    pub fn from_config(
        config: &GatewayConfig,
        log: Arc<dyn DeliveryLogStore>,
        sink: Arc<dyn MetricsSink>,
    ) -> Result<Self, GatewayError> {
        let default_timeout = Duration::from_millis(config.default_timeout_ms);
        let mut builder = Self::builder(log)
            .sink(sink)
            .bulk_delay(Duration::from_millis(config.bulk_delay_ms))
            .default_timeout(default_timeout)
            .default_country_code(config.default_country_code.clone());

        for entry in &config.providers {
            let adapter = entry
                .build(default_timeout)
                .map_err(|source| GatewayError::Provider { name: entry.name.clone(), source })?;
            builder = builder.provider_with(adapter, entry.timeout(default_timeout), entry.rate_limit)?;
        }

        let gateway = builder.build();
        info!(
            "Delivery gateway ready with {} provider(s): {:?}",
            gateway.providers.len(),
            gateway.providers.iter().map(|p| p.adapter.name()).collect::<Vec<_>>()
        );
        Ok(gateway)
    }

    /// Provider names for `channel`, highest priority first.
    pub fn provider_names(&self, channel: Channel) -> Vec<&str> {
        self.providers_for(channel).map(|p| p.adapter.name()).collect()
    }

    fn providers_for(&self, channel: Channel) -> impl Iterator<Item = &RegisteredProvider> {
        self.providers.iter().filter(move |p| p.adapter.channel() == channel)
    }

    /// The address `recipient` will be sent to on `channel`.
    pub fn normalize_recipient(&self, channel: Channel, recipient: &str) -> String {
        match channel {
            Channel::Email => recipient.trim().to_string(),
            Channel::Whatsapp | Channel::Sms => {
                normalize_phone(recipient, self.default_country_code.as_deref())
            }
        }
    }

    /// Send one message with failover.
    #[instrument(skip(self, request), fields(channel = %request.channel))]
    pub async fn send(&self, request: &DeliveryRequest) -> DeliveryReport {
        let recipient = self.normalize_recipient(request.channel, &request.recipient);
        if !is_valid_address(request.channel, &recipient) {
            warn!("refusing send: '{}' is not a valid {} address", request.recipient, request.channel);
            self.sink.increment("delivery.rejected", &[("reason", "invalid_recipient")]);
            return DeliveryReport::rejected("invalid_recipient");
        }
        if request.message.trim().is_empty() && request.template.is_none() {
            self.sink.increment("delivery.rejected", &[("reason", "empty_message")]);
            return DeliveryReport::rejected("empty_message");
        }

        let candidates: Vec<&RegisteredProvider> = self.providers_for(request.channel).collect();
        if candidates.is_empty() {
            error!("no providers configured for channel {}", request.channel);
            self.sink.increment("delivery.rejected", &[("reason", "no_providers_configured")]);
            return DeliveryReport::rejected("no_providers_configured");
        }

        let message = OutboundMessage {
            recipient,
            body: request.message.clone(),
            template: request.template.clone(),
        };

        let mut attempts = Vec::with_capacity(candidates.len());
        for provider in candidates {
            let attempt = self.attempt(provider, &message, request).await;
            self.record(&attempt).await;

            let delivered = attempt.is_delivered();
            let name = attempt.provider.clone();
            if !delivered {
                warn!(
                    "provider '{}' failed for {}: {}",
                    name,
                    message.recipient,
                    attempt.error_message.as_deref().unwrap_or("unknown error")
                );
            }
            attempts.push(attempt);

            if delivered {
                info!("delivered to {} via '{}' after {} attempt(s)", message.recipient, name, attempts.len());
                self.sink.increment("delivery.sent", &[("provider", name.as_str())]);
                return DeliveryReport {
                    success: true,
                    provider_used: Some(name),
                    attempts,
                    rejected: None,
                };
            }
        }

        error!("all {} provider(s) failed for {}", attempts.len(), message.recipient);
        self.sink.increment("delivery.exhausted", &[("channel", request.channel.as_str())]);
        DeliveryReport {
            success: false,
            provider_used: None,
            attempts,
            rejected: None,
        }
    }

    async fn attempt(
        &self,
        provider: &RegisteredProvider,
        message: &OutboundMessage,
        request: &DeliveryRequest,
    ) -> DeliveryAttempt {
        if let Some(limiter) = &provider.limiter {
            limiter.acquire().await;
        }

        let started = Instant::now();
        let result = tokio::time::timeout(provider.timeout, provider.adapter.send(message)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let (status, provider_response, error_message) = match result {
            Err(_) => {
                let err = ProviderError::Timeout(provider.timeout.as_millis() as u64);
                (AttemptStatus::Failed, None, Some(err.to_string()))
            }
            Ok(Err(err)) => (AttemptStatus::Failed, None, Some(err.to_string())),
            Ok(Ok(resp)) if provider.adapter.is_accepted(&resp) => {
                (AttemptStatus::Delivered, Some(resp.body), None)
            }
            Ok(Ok(resp)) => {
                let msg = format!("provider rejected message (HTTP {})", resp.status_code);
                (AttemptStatus::Failed, Some(resp.body), Some(msg))
            }
        };

        let name = provider.adapter.name();
        self.sink.increment("delivery.attempt", &[("provider", name), ("status", status.as_str())]);
        self.sink.observe("delivery.attempt.latency_ms", elapsed_ms as f64, &[("provider", name)]);

        DeliveryAttempt {
            id: Uuid::new_v4(),
            context: request.context,
            provider: name.to_string(),
            channel: request.channel,
            recipient: message.recipient.clone(),
            message: message.body.clone(),
            status,
            response_time_ms: elapsed_ms,
            provider_response,
            error_message,
            created_at: Utc::now(),
        }
    }

    async fn record(&self, attempt: &DeliveryAttempt) {
        if let Err(err) = self.log.append(attempt).await {
            // Losing the audit row must not turn a delivery into a failure.
            error!("failed to persist delivery attempt {}: {}", attempt.id, err);
            self.sink.increment("delivery.log_write_failed", &[("provider", attempt.provider.as_str())]);
        }
    }

    /// Send `message` to each recipient in turn, pausing `bulk_delay`
    /// between sends. Invalid addresses are skipped and don't count as
    /// failures; one recipient's failure never stops the batch.
    #[instrument(skip(self, recipients, message, template), fields(channel = %channel, total = recipients.len()))]
    pub async fn bulk_send(
        &self,
        recipients: &[String],
        message: &str,
        channel: Channel,
        template: Option<TemplateRef>,
    ) -> BulkSummary {
        let mut results = Vec::with_capacity(recipients.len());
        let (mut success_count, mut failure_count, mut skipped_count) = (0, 0, 0);
        let mut sent_any = false;

        for recipient in recipients {
            let normalized = self.normalize_recipient(channel, recipient);
            if !is_valid_address(channel, &normalized) {
                skipped_count += 1;
                results.push(BulkResult {
                    recipient: recipient.clone(),
                    outcome: BulkOutcome::Skipped { reason: "invalid_recipient".into() },
                });
                continue;
            }

            if sent_any && !self.bulk_delay.is_zero() {
                tokio::time::sleep(self.bulk_delay).await;
            }
            sent_any = true;

            let mut request = DeliveryRequest::new(channel, recipient.clone(), message);
            request.template = template.clone();
            let report = self.send(&request).await;

            let outcome = match report.provider_used {
                Some(provider) if report.success => {
                    success_count += 1;
                    BulkOutcome::Sent { provider }
                }
                _ => {
                    failure_count += 1;
                    BulkOutcome::Failed { error: report.last_error().map(str::to_string) }
                }
            };
            results.push(BulkResult { recipient: recipient.clone(), outcome });
        }

        info!(
            "bulk send finished: {} sent, {} failed, {} skipped",
            success_count, failure_count, skipped_count
        );
        BulkSummary {
            total: recipients.len(),
            success_count,
            failure_count,
            skipped_count,
            results,
        }
    }

    /// Probe every provider concurrently. Purely observational: the failover
    /// order is never changed by the result.
    pub async fn provider_health(&self) -> Vec<ProviderHealth> {
        let probes = self.providers.iter().map(|p| async move {
            let started = Instant::now();
            let result = tokio::time::timeout(p.timeout, p.adapter.health_check()).await;
            let latency_ms = started.elapsed().as_millis() as u64;
            let (healthy, detail) = match result {
                Ok(Ok(probe)) => (probe.healthy, probe.detail),
                Ok(Err(err)) => (false, Some(err.to_string())),
                Err(_) => (false, Some(ProviderError::Timeout(p.timeout.as_millis() as u64).to_string())),
            };
            (p, healthy, latency_ms, detail)
        });

        let probed = join_all(probes).await;
        probed
            .into_iter()
            .map(|(p, healthy, latency_ms, detail)| {
                let channel = p.adapter.channel();
                let priority = self
                    .providers_for(channel)
                    .position(|q| q.adapter.name() == p.adapter.name())
                    .map_or(0, |i| i + 1);
                ProviderHealth {
                    name: p.adapter.name().to_string(),
                    channel,
                    priority,
                    healthy,
                    latency_ms,
                    detail,
                }
            })
            .collect()
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{DeliveryLogFilter, InMemoryDeliveryLog};
    use crate::sink::RecordingSink;
    use crate::LogStoreError;
    use async_trait::async_trait;
    use providers::mock::{MockBehaviour, MockProvider};

    fn gateway_with(
        log: Arc<InMemoryDeliveryLog>,
        providers: Vec<MockProvider>,
    ) -> DeliveryGateway {
        let mut builder = DeliveryGateway::builder(log)
            .bulk_delay(Duration::from_millis(250))
            .default_timeout(Duration::from_millis(500))
            .default_country_code(Some("62".into()));
        for p in providers {
            builder = builder.provider(Arc::new(p)).expect("unique names");
        }
        builder.build()
    }

    #[tokio::test]
    async fn fails_over_in_priority_order_and_logs_every_attempt() {
        let log = Arc::new(InMemoryDeliveryLog::new());
        let gw = gateway_with(
            log.clone(),
            vec![
                MockProvider::failing("provider1", Channel::Whatsapp, 503),
                MockProvider::erroring("provider2", Channel::Whatsapp, ProviderError::Unauthorized("bad key".into())),
                MockProvider::delivering("provider3", Channel::Whatsapp),
            ],
        );

        let report = gw.send(&DeliveryRequest::new(Channel::Whatsapp, "08123456789", "hello")).await;

        assert!(report.success);
        assert_eq!(report.provider_used.as_deref(), Some("provider3"));
        assert_eq!(report.attempts.len(), 3);

        let logged = log.attempts();
        let names: Vec<&str> = logged.iter().map(|a| a.provider.as_str()).collect();
        assert_eq!(names, vec!["provider1", "provider2", "provider3"]);
        let statuses: Vec<AttemptStatus> = logged.iter().map(|a| a.status).collect();
        assert_eq!(statuses, vec![AttemptStatus::Failed, AttemptStatus::Failed, AttemptStatus::Delivered]);
        // Normalised with the default country code.
        assert!(logged.iter().all(|a| a.recipient == "628123456789"));
    }

    #[tokio::test]
    async fn all_providers_failing_is_a_value_not_an_error() {
        let log = Arc::new(InMemoryDeliveryLog::new());
        let gw = gateway_with(
            log.clone(),
            vec![
                MockProvider::failing("a", Channel::Sms, 500),
                MockProvider::failing("b", Channel::Sms, 429),
                MockProvider::erroring("c", Channel::Sms, ProviderError::Transport("reset".into())),
            ],
        );

        let report = gw.send(&DeliveryRequest::new(Channel::Sms, "+15550100", "x")).await;

        assert!(!report.success);
        assert_eq!(report.provider_used, None);
        assert_eq!(report.attempts.len(), 3);
        assert!(report.attempts.iter().all(|a| a.status == AttemptStatus::Failed));
        assert_eq!(log.len(), 3);
        assert!(report.last_error().is_some_and(|e| e.contains("reset")));
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let log = Arc::new(InMemoryDeliveryLog::new());
        let second = MockProvider::delivering("second", Channel::Whatsapp);
        let gw = gateway_with(
            log.clone(),
            vec![MockProvider::delivering("first", Channel::Whatsapp), second.clone()],
        );

        let report = gw.send(&DeliveryRequest::new(Channel::Whatsapp, "+628123456", "x")).await;
        assert_eq!(report.provider_used.as_deref(), Some("first"));
        assert_eq!(second.call_count(), 0);
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn only_providers_of_the_requested_channel_are_tried() {
        let log = Arc::new(InMemoryDeliveryLog::new());
        let sms = MockProvider::delivering("sms", Channel::Sms);
        let gw = gateway_with(
            log.clone(),
            vec![sms.clone(), MockProvider::delivering("mail", Channel::Email)],
        );

        let report = gw.send(&DeliveryRequest::new(Channel::Email, "a@example.com", "x")).await;
        assert_eq!(report.provider_used.as_deref(), Some("mail"));
        assert_eq!(sms.call_count(), 0);
        assert_eq!(gw.provider_names(Channel::Sms), vec!["sms"]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out_and_next_one_is_used() {
        let log = Arc::new(InMemoryDeliveryLog::new());
        let slow = MockProvider::delivering("slow", Channel::Whatsapp)
            .then(MockBehaviour::Hang(Duration::from_secs(30)));
        let gw = gateway_with(log.clone(), vec![slow, MockProvider::delivering("fast", Channel::Whatsapp)]);

        let report = gw.send(&DeliveryRequest::new(Channel::Whatsapp, "+628123456", "x")).await;
        assert_eq!(report.provider_used.as_deref(), Some("fast"));
        let first = &log.attempts()[0];
        assert_eq!(first.status, AttemptStatus::Failed);
        assert!(first.error_message.as_deref().is_some_and(|e| e.contains("timed out")));
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected_without_attempts() {
        let log = Arc::new(InMemoryDeliveryLog::new());
        let gw = gateway_with(log.clone(), vec![MockProvider::delivering("p", Channel::Whatsapp)]);

        let empty_recipient = gw.send(&DeliveryRequest::new(Channel::Whatsapp, "  ", "x")).await;
        assert_eq!(empty_recipient.rejected.as_deref(), Some("invalid_recipient"));

        let empty_message = gw.send(&DeliveryRequest::new(Channel::Whatsapp, "+628123456", " ")).await;
        assert_eq!(empty_message.rejected.as_deref(), Some("empty_message"));

        let no_provider = gw.send(&DeliveryRequest::new(Channel::Sms, "+628123456", "x")).await;
        assert_eq!(no_provider.rejected.as_deref(), Some("no_providers_configured"));

        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn attempts_carry_execution_context() {
        let log = Arc::new(InMemoryDeliveryLog::new());
        let gw = gateway_with(log.clone(), vec![MockProvider::delivering("p", Channel::Whatsapp)]);
        let context = AttemptContext {
            execution_id: Some(Uuid::new_v4()),
            sequence_id: Some(Uuid::new_v4()),
            customer_id: Some(Uuid::new_v4()),
        };
        let mut request = DeliveryRequest::new(Channel::Whatsapp, "+628123456", "x");
        request.context = context;
        gw.send(&request).await;

        let filter = DeliveryLogFilter { campaign: context.sequence_id, ..Default::default() };
        let rows = log.query(&filter).await.expect("query");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].context, context);
    }

    #[tokio::test(start_paused = true)]
    async fn bulk_send_skips_invalid_addresses_and_never_aborts() {
        let log = Arc::new(InMemoryDeliveryLog::new());
        // The third real send fails on the only provider.
        let provider = MockProvider::delivering("p", Channel::Whatsapp)
            .then(MockBehaviour::Deliver)
            .then(MockBehaviour::Deliver)
            .then(MockBehaviour::Status(500));
        let gw = gateway_with(log.clone(), vec![provider]);

        let mut recipients: Vec<String> = (0..10).map(|i| format!("+62812345670{i}")).collect();
        recipients[4] = String::new();

        let started = tokio::time::Instant::now();
        let summary = gw.bulk_send(&recipients, "promo", Channel::Whatsapp, None).await;

        assert_eq!(summary.total, 10);
        assert_eq!(summary.skipped_count, 1);
        assert_eq!(summary.success_count + summary.failure_count, 9);
        assert_eq!(summary.failure_count, 1);
        assert!(matches!(summary.results[4].outcome, BulkOutcome::Skipped { .. }));
        // Eight pauses between nine real sends.
        assert!(started.elapsed() >= Duration::from_millis(8 * 250));
    }

    #[tokio::test]
    async fn health_reports_each_provider_without_reordering() {
        let log = Arc::new(InMemoryDeliveryLog::new());
        let gw = gateway_with(
            log,
            vec![
                MockProvider::delivering("a", Channel::Whatsapp).unhealthy(),
                MockProvider::delivering("b", Channel::Whatsapp),
                MockProvider::delivering("c", Channel::Sms),
            ],
        );

        let health = gw.provider_health().await;
        let summary: Vec<(&str, usize, bool)> =
            health.iter().map(|h| (h.name.as_str(), h.priority, h.healthy)).collect();
        assert_eq!(summary, vec![("a", 1, false), ("b", 2, true), ("c", 1, true)]);
        assert_eq!(gw.provider_names(Channel::Whatsapp), vec!["a", "b"]);
    }

    #[test]
    fn duplicate_provider_names_are_rejected() {
        let log = Arc::new(InMemoryDeliveryLog::new());
        let result = DeliveryGateway::builder(log)
            .provider(Arc::new(MockProvider::delivering("x", Channel::Sms)))
            .and_then(|b| b.provider(Arc::new(MockProvider::delivering("x", Channel::Email))));
        assert!(matches!(result, Err(GatewayError::DuplicateProvider { .. })));
    }

    struct BrokenLog;

    #[async_trait]
    impl DeliveryLogStore for BrokenLog {
        async fn append(&self, _attempt: &DeliveryAttempt) -> Result<(), LogStoreError> {
            Err(LogStoreError::Corrupt { id: Uuid::nil(), message: "disk full".into() })
        }
        async fn query(&self, _f: &DeliveryLogFilter) -> Result<Vec<DeliveryAttempt>, LogStoreError> {
            Ok(Vec::new())
        }
        async fn stats(&self, _f: &DeliveryLogFilter) -> Result<crate::log::DeliveryStats, LogStoreError> {
            Ok(crate::log::DeliveryStats::from_providers(Vec::new()))
        }
    }

    #[tokio::test]
    async fn log_write_failure_does_not_fail_the_send() {
        let sink = Arc::new(RecordingSink::new());
        let gw = DeliveryGateway::builder(Arc::new(BrokenLog))
            .sink(sink.clone())
            .provider(Arc::new(MockProvider::delivering("p", Channel::Whatsapp)))
            .expect("provider")
            .build();

        let report = gw.send(&DeliveryRequest::new(Channel::Whatsapp, "+628123456", "x")).await;
        assert!(report.success);
        assert_eq!(sink.count("delivery.log_write_failed", None), 1);
    }
}
