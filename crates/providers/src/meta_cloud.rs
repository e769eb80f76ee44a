//! WhatsApp Cloud API adapter.
//!
//! Free-form text goes out as a `text` message; when the step names a
//! template the message is sent as a `template` with body parameters in
//! key order (numeric keys sort numerically, so `"10"` follows `"9"`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::http::{client_with_timeout, read_response, request_error};
use crate::{
    Channel, HealthProbe, OutboundMessage, ProviderAdapter, ProviderError, ProviderResponse,
    TemplateRef,
};

pub struct MetaCloudProvider {
    name: String,
    endpoint: String,
    phone_number_id: String,
    access_token: String,
    language: String,
    timeout: Duration,
    client: Client,
}

impl MetaCloudProvider {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        phone_number_id: impl Into<String>,
        access_token: impl Into<String>,
        language: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            name: name.into(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            phone_number_id: phone_number_id.into(),
            access_token: access_token.into(),
            language: language.into(),
            timeout,
            client: client_with_timeout(timeout)?,
        })
    }

    fn payload(&self, message: &OutboundMessage) -> Value {
        match &message.template {
            Some(template) => {
                let parameters: Vec<Value> = ordered_params(template)
                    .into_iter()
                    .map(|text| json!({ "type": "text", "text": text }))
                    .collect();
                json!({
                    "messaging_product": "whatsapp",
                    "to": message.recipient,
                    "type": "template",
                    "template": {
                        "name": template.name,
                        "language": { "code": self.language },
                        "components": [{ "type": "body", "parameters": parameters }],
                    },
                })
            }
            None => json!({
                "messaging_product": "whatsapp",
                "to": message.recipient,
                "type": "text",
                "text": { "body": message.body },
            }),
        }
    }
}

/// Template parameter values in send order.
pub(crate) fn ordered_params(template: &TemplateRef) -> Vec<&str> {
    let mut entries: Vec<(&String, &String)> = template.params.iter().collect();
    entries.sort_by(|(a, _), (b, _)| match (a.parse::<u32>(), b.parse::<u32>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    });
    entries.into_iter().map(|(_, v)| v.as_str()).collect()
}

#[async_trait]
impl ProviderAdapter for MetaCloudProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel(&self) -> Channel {
        Channel::Whatsapp
    }

    async fn send(&self, message: &OutboundMessage) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/{}/messages", self.endpoint, self.phone_number_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&self.payload(message))
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout))?;
        read_response(resp).await
    }

    async fn health_check(&self) -> Result<HealthProbe, ProviderError> {
        let url = format!("{}/{}", self.endpoint, self.phone_number_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
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
        response.is_success()
            && response
                .body
                .get("messages")
                .and_then(Value::as_array)
                .is_some_and(|m| !m.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> MetaCloudProvider {
        MetaCloudProvider::new("meta", server.uri(), "12345", "tok", "id", Duration::from_secs(2))
            .expect("client builds")
    }

    #[test]
    fn numeric_param_keys_sort_numerically() {
        let mut template = TemplateRef { name: "promo".into(), ..Default::default() };
        for (k, v) in [("10", "j"), ("2", "b"), ("1", "a")] {
            template.params.insert(k.into(), v.into());
        }
        assert_eq!(ordered_params(&template), vec!["a", "b", "j"]);
    }

    #[tokio::test]
    async fn text_message_is_accepted_when_message_id_returned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/12345/messages"))
            .and(bearer_token("tok"))
            .and(body_partial_json(json!({ "type": "text", "text": { "body": "hi" } })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "messages": [{ "id": "wamid.1" }] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let p = provider(&server);
        let resp = p.send(&OutboundMessage::text("628123", "hi")).await.expect("sent");
        assert!(p.is_accepted(&resp));
    }

    #[tokio::test]
    async fn template_message_carries_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/12345/messages"))
            .and(body_partial_json(json!({
                "type": "template",
                "template": { "name": "welcome", "language": { "code": "id" } }
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "messages": [{ "id": "x" }] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut template = TemplateRef { name: "welcome".into(), ..Default::default() };
        template.params.insert("1".into(), "Budi".into());
        let msg = OutboundMessage { template: Some(template), ..OutboundMessage::text("628", "") };
        let resp = provider(&server).send(&msg).await.expect("sent");
        assert_eq!(resp.status_code, 200);
    }

    #[tokio::test]
    async fn unauthorized_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .send(&OutboundMessage::text("628", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unauthorized(_)));
    }
}
