//! Shared helpers for the HTTP-backed adapters.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::{ProviderError, ProviderResponse};

/// Build a client whose requests give up after `timeout`.
pub(crate) fn client_with_timeout(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Configuration(format!("cannot build HTTP client: {e}")))
}

/// Map a `reqwest` failure, filling in the timeout we actually configured.
pub(crate) fn request_error(err: reqwest::Error, timeout: Duration) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(timeout.as_millis() as u64)
    } else {
        ProviderError::from(err)
    }
}

/// Turn an HTTP response into a [`ProviderResponse`].
///
/// 401/403 become [`ProviderError::Unauthorized`]. A 2xx body that isn't JSON
/// is malformed; error bodies that aren't JSON are kept as a string.
pub(crate) async fn read_response(resp: Response) -> Result<ProviderResponse, ProviderError> {
    let status = resp.status();
    let text = resp.text().await.map_err(ProviderError::from)?;
    debug!("provider answered HTTP {} ({} bytes)", status, text.len());

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ProviderError::Unauthorized(truncate(&text)));
    }

    let body = match serde_json::from_str::<Value>(&text) {
        Ok(v) => v,
        Err(_) if text.trim().is_empty() => Value::Null,
        Err(e) if status.is_success() => {
            return Err(ProviderError::MalformedResponse(format!(
                "expected JSON body: {e}"
            )));
        }
        Err(_) => Value::String(truncate(&text)),
    };

    Ok(ProviderResponse {
        status_code: status.as_u16(),
        body,
    })
}

fn truncate(text: &str) -> String {
    const LIMIT: usize = 512;
    if text.len() <= LIMIT {
        return text.to_string();
    }
    let mut end = LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}
