//! Configuration-driven adapter construction.
//!
//! Provider entries come from the `[[gateway.providers]]` tables of the
//! config file. Credential fields accept `env:NAME` to read the value from
//! the environment at build time.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::http_gateway::{HttpGatewayProvider, HttpGatewaySettings};
use crate::meta_cloud::MetaCloudProvider;
use crate::twilio::TwilioProvider;
use crate::{Channel, ProviderAdapter, ProviderError};

/// Token-bucket settings for a single provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Sustained sends per second.
    pub per_second: f64,
    /// Bucket size.
    #[serde(default = "default_burst")]
    pub burst: u32,
}

fn default_burst() -> u32 {
    1
}

/// One configured provider. Position in the list is its priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub channel: Channel,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub rate_limit: Option<RateLimit>,
    #[serde(flatten)]
    pub kind: ProviderKind,
}

/// Backend-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderKind {
    MetaCloud {
        #[serde(default = "default_meta_endpoint")]
        endpoint: String,
        phone_number_id: String,
        access_token: String,
        #[serde(default = "default_language")]
        language: String,
    },
    Twilio {
        #[serde(default = "default_twilio_endpoint")]
        endpoint: String,
        account_sid: String,
        auth_token: String,
        from: String,
    },
    HttpGateway {
        endpoint: String,
        #[serde(default)]
        health_endpoint: Option<String>,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default = "default_auth_header")]
        auth_header: String,
        #[serde(default)]
        auth_prefix: String,
        #[serde(default = "default_recipient_field")]
        recipient_field: String,
        #[serde(default = "default_message_field")]
        message_field: String,
        #[serde(default)]
        success_field: Option<String>,
    },
}

fn default_meta_endpoint() -> String {
    "https://graph.facebook.com/v19.0".into()
}
fn default_language() -> String {
    "en".into()
}
fn default_twilio_endpoint() -> String {
    "https://api.twilio.com".into()
}
fn default_auth_header() -> String {
    "Authorization".into()
}
fn default_recipient_field() -> String {
    "target".into()
}
fn default_message_field() -> String {
    "message".into()
}

/// Resolve `env:NAME` references; other values are returned unchanged.
pub fn resolve_secret(value: &str) -> Result<String, ProviderError> {
    match value.strip_prefix("env:") {
        Some(var) => std::env::var(var)
            .map_err(|_| ProviderError::Configuration(format!("environment variable {var} is not set"))),
        None => Ok(value.to_string()),
    }
}

impl ProviderConfig {
    /// Effective request timeout.
    pub fn timeout(&self, default: Duration) -> Duration {
        self.timeout_ms.map(Duration::from_millis).unwrap_or(default)
    }

    /// Build the adapter this entry describes.
    pub fn build(&self, default_timeout: Duration) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
        let timeout = self.timeout(default_timeout);
        let adapter: Arc<dyn ProviderAdapter> = match &self.kind {
            ProviderKind::MetaCloud { endpoint, phone_number_id, access_token, language } => {
                if self.channel != Channel::Whatsapp {
                    return Err(ProviderError::Configuration(format!(
                        "provider '{}': meta_cloud only serves whatsapp",
                        self.name
                    )));
                }
                Arc::new(MetaCloudProvider::new(
                    &self.name,
                    endpoint,
                    phone_number_id,
                    resolve_secret(access_token)?,
                    language,
                    timeout,
                )?)
            }
            ProviderKind::Twilio { endpoint, account_sid, auth_token, from } => {
                Arc::new(TwilioProvider::new(
                    &self.name,
                    self.channel,
                    endpoint,
                    resolve_secret(account_sid)?,
                    resolve_secret(auth_token)?,
                    from,
                    timeout,
                )?)
            }
            ProviderKind::HttpGateway {
                endpoint,
                health_endpoint,
                api_key,
                auth_header,
                auth_prefix,
                recipient_field,
                message_field,
                success_field,
            } => {
                let settings = HttpGatewaySettings {
                    endpoint: endpoint.clone(),
                    health_endpoint: health_endpoint.clone(),
                    api_key: api_key.as_deref().map(resolve_secret).transpose()?,
                    auth_header: auth_header.clone(),
                    auth_prefix: auth_prefix.clone(),
                    recipient_field: recipient_field.clone(),
                    message_field: message_field.clone(),
                    success_field: success_field.clone(),
                };
                Arc::new(HttpGatewayProvider::new(&self.name, self.channel, settings, timeout)?)
            }
        };
        Ok(adapter)
    }
}
