//! `providers` crate — the `ProviderAdapter` trait and the delivery backends.
//!
//! Every backend the gateway can fail over between implements
//! [`ProviderAdapter`]. The gateway crate dispatches through this trait
//! object and never sees backend-specific types.

pub mod config;
pub mod error;
pub(crate) mod http;
pub mod http_gateway;
pub mod meta_cloud;
pub mod mock;
pub mod recipient;
pub mod traits;
pub mod twilio;

pub use config::{ProviderConfig, ProviderKind, RateLimit};
pub use error::ProviderError;
pub use traits::{Channel, HealthProbe, OutboundMessage, ProviderAdapter, ProviderResponse, TemplateRef};
