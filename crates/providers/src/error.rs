//! Provider-level error type.

use thiserror::Error;

/// Errors returned by a provider adapter's `send` or `health_check`.
///
/// The gateway treats every variant the same way (log a failed attempt and
/// move on to the next provider); the variant only changes what lands in the
/// delivery log.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The backend did not answer within the configured timeout.
    #[error("provider timed out after {0} ms")]
    Timeout(u64),

    /// Credentials were rejected (401 / 403).
    #[error("provider rejected credentials: {0}")]
    Unauthorized(String),

    /// Any other non-2xx response.
    #[error("provider returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The response body could not be interpreted.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    /// Connection-level failure (DNS, TLS, reset, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The adapter is missing required configuration.
    #[error("provider misconfigured: {0}")]
    Configuration(String),
}

impl ProviderError {
    /// Short machine-readable label, used as a metrics tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Unauthorized(_) => "unauthorized",
            Self::HttpStatus { .. } => "http_status",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Transport(_) => "transport",
            Self::Configuration(_) => "configuration",
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest doesn't tell us which timeout fired.
            Self::Timeout(0)
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}
