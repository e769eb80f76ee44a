//! Generic JSON gateway adapter.
//!
//! Covers the long tail of local WhatsApp/SMS gateways and e-mail relays
//! that accept `POST {endpoint}` with a flat JSON body. Field names, the
//! auth header and the field that signals acceptance are all configurable.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};

use crate::http::{client_with_timeout, read_response, request_error};
use crate::meta_cloud::ordered_params;
use crate::{Channel, HealthProbe, OutboundMessage, ProviderAdapter, ProviderError, ProviderResponse};

/// Wire settings for [`HttpGatewayProvider`].
#[derive(Debug, Clone)]
pub struct HttpGatewaySettings {
    pub endpoint: String,
    pub health_endpoint: Option<String>,
    pub api_key: Option<String>,
    pub auth_header: String,
    /// Prepended to the key, e.g. `"Bearer "`.
    pub auth_prefix: String,
    pub recipient_field: String,
    pub message_field: String,
    /// Body field that must be truthy for the send to count.
    pub success_field: Option<String>,
}

pub struct HttpGatewayProvider {
    name: String,
    channel: Channel,
    settings: HttpGatewaySettings,
    timeout: Duration,
    client: Client,
}

impl HttpGatewayProvider {
    pub fn new(
        name: impl Into<String>,
        channel: Channel,
        settings: HttpGatewaySettings,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        if settings.endpoint.trim().is_empty() {
            return Err(ProviderError::Configuration("http_gateway needs an endpoint".into()));
        }
        Ok(Self {
            name: name.into(),
            channel,
            settings,
            timeout,
            client: client_with_timeout(timeout)?,
        })
    }

    fn payload(&self, message: &OutboundMessage) -> Value {
        let mut body = Map::new();
        body.insert(self.settings.recipient_field.clone(), Value::String(message.recipient.clone()));
        body.insert(self.settings.message_field.clone(), Value::String(message.body.clone()));
        if let Some(template) = &message.template {
            body.insert("template".into(), Value::String(template.name.clone()));
            body.insert(
                "params".into(),
                Value::Array(
                    ordered_params(template)
                        .into_iter()
                        .map(|p| Value::String(p.to_string()))
                        .collect(),
                ),
            );
        }
        Value::Object(body)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.settings.api_key {
            Some(key) => req.header(
                self.settings.auth_header.as_str(),
                format!("{}{key}", self.settings.auth_prefix),
            ),
            None => req,
        }
    }
}

/// Lenient truthiness for gateway status fields.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        Value::String(s) => matches!(
            s.to_ascii_lowercase().as_str(),
            "true" | "ok" | "success" | "sent" | "queued" | "1"
        ),
        _ => false,
    }
}

#[async_trait]
impl ProviderAdapter for HttpGatewayProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, message: &OutboundMessage) -> Result<ProviderResponse, ProviderError> {
        let req = self.client.post(&self.settings.endpoint).json(&self.payload(message));
        let resp = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout))?;
        read_response(resp).await
    }

    async fn health_check(&self) -> Result<HealthProbe, ProviderError> {
        let Some(url) = &self.settings.health_endpoint else {
            return Ok(HealthProbe {
                healthy: true,
                detail: Some("no health endpoint configured".into()),
            });
        };
        let resp = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout))?;
        let response = read_response(resp).await?;
        Ok(HealthProbe {
            healthy: response.is_success(),
            detail: (!response.is_success()).then(|| format!("HTTP {}", response.status_code)),
        })
    }

    fn is_accepted(&self, response: &ProviderResponse) -> bool {
        if !response.is_success() {
            return false;
        }
        match &self.settings.success_field {
            Some(field) => response.body.get(field).is_some_and(truthy),
            None => true,
        }
    }
}
