//! `outreach.toml`: one file configuring every sub-command.

use std::path::Path;

use anyhow::Context;
use engine::{EngineConfig, WorkerConfig};
use gateway::GatewayConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Overridden by `--database-url` / `DATABASE_URL`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: None, max_connections: default_max_connections() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl AppConfig {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("invalid configuration")
    }

    /// Read `path`; a missing file yields the defaults and `false`.
    pub fn load(path: &Path) -> anyhow::Result<(Self, bool)> {
        if !path.exists() {
            return Ok((Self::default(), false));
        }
        let text = std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
        let config = Self::parse(&text).with_context(|| format!("in {}", path.display()))?;
        Ok((config, true))
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database
            .url
            .as_deref()
            .context("no database url: set DATABASE_URL, --database-url or [database] url")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::DeliveryFailurePolicy;
    use providers::{Channel, ProviderKind};

    #[test]
    fn empty_file_gives_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.gateway.bulk_delay_ms, 1000);
        assert_eq!(config.engine.delivery_failure, DeliveryFailurePolicy::Stall);
        assert_eq!(config.worker.poll_interval_ms, 1000);
        assert!(config.database_url().is_err());
    }

    #[test]
    fn full_file_parses() {
        let text = r#"
            log_format = "json"

            [database]
            url = "postgres://localhost/outreach"
            max_connections = 4

            [server]
            bind = "127.0.0.1:9000"

            [gateway]
            bulk_delay_ms = 250
            default_country_code = "62"

            [[gateway.providers]]
            name = "meta"
            kind = "meta_cloud"
            channel = "whatsapp"
            endpoint = "https://graph.facebook.com/v19.0"
            phone_number_id = "123"
            access_token = "env:META_TOKEN"
            rate_limit = { per_second = 20.0, burst = 40 }

            [engine]
            delivery_failure = { mode = "retry", max_attempts = 4, base_delay_secs = 60, max_delay_secs = 3600 }

            [worker]
            poll_interval_ms = 200
        "#;
        let config = AppConfig::parse(text).unwrap();

        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.database_url().unwrap(), "postgres://localhost/outreach");
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.gateway.providers.len(), 1);
        assert!(matches!(config.gateway.providers[0].kind, ProviderKind::MetaCloud { .. }));
        assert_eq!(config.gateway.providers[0].channel, Channel::Whatsapp);
        assert_eq!(config.engine.delivery_failure, DeliveryFailurePolicy::retry(4, 60, 3600));
        assert_eq!(config.worker.poll_interval_ms, 200);
        assert_eq!(config.worker.max_job_attempts, 5);
    }
}
