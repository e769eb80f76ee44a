//! Twilio Messages API adapter (SMS and WhatsApp).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::http::{client_with_timeout, read_response, request_error};
use crate::{Channel, HealthProbe, OutboundMessage, ProviderAdapter, ProviderError, ProviderResponse};

pub struct TwilioProvider {
    name: String,
    channel: Channel,
    endpoint: String,
    account_sid: String,
    auth_token: String,
    from: String,
    timeout: Duration,
    client: Client,
}

impl TwilioProvider {
    pub fn new(
        name: impl Into<String>,
        channel: Channel,
        endpoint: impl Into<String>,
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        if channel == Channel::Email {
            return Err(ProviderError::Configuration(
                "twilio cannot deliver on the email channel".into(),
            ));
        }
        Ok(Self {
            name: name.into(),
            channel,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from: from.into(),
            timeout,
            client: client_with_timeout(timeout)?,
        })
    }

    fn address(&self, raw: &str) -> String {
        match self.channel {
            Channel::Whatsapp if !raw.starts_with("whatsapp:") => format!("whatsapp:{raw}"),
            _ => raw.to_string(),
        }
    }

    fn account_url(&self) -> String {
        format!("{}/2010-04-01/Accounts/{}", self.endpoint, self.account_sid)
    }
}

#[async_trait]
impl ProviderAdapter for TwilioProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, message: &OutboundMessage) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/Messages.json", self.account_url());
        let to = self.address(&message.recipient);
        let from = self.address(&self.from);
        let mut form = vec![("To", to), ("From", from), ("Body", message.body.clone())];
        if let Some(template) = &message.template {
            // Content templates are addressed by SID.
            form.push(("ContentSid", template.name.clone()));
            if !template.params.is_empty() {
                let vars = serde_json::to_string(&template.params)
                    .map_err(|e| ProviderError::Configuration(e.to_string()))?;
                form.push(("ContentVariables", vars));
            }
        }

        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout))?;
        read_response(resp).await
    }

    async fn health_check(&self) -> Result<HealthProbe, ProviderError> {
        let url = format!("{}.json", self.account_url());
        let resp = self
            .client
            .get(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout))?;
        let response = read_response(resp).await?;
        let status = response.body.get("status").and_then(Value::as_str).unwrap_or("unknown");
        let healthy = response.is_success() && status == "active";
        Ok(HealthProbe {
            healthy,
            detail: (!healthy).then(|| format!("HTTP {}, account status {status}", response.status_code)),
        })
    }

    fn is_accepted(&self, response: &ProviderResponse) -> bool {
        let status = response.body.get("status").and_then(Value::as_str);
        response.is_success() && !matches!(status, Some("failed") | Some("undelivered"))
    }
}
