//! `outreach` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    — start the API server (optionally with an in-process worker).
//! - `worker`   — start a queue worker that advances due executions.
//! - `migrate`  — run pending database migrations.
//! - `validate` — validate a sequence definition JSON file.
//! - `prune`    — soft-delete finished executions older than N days.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use db::{DbPool, PoolSettings};
use engine::store::ExecutionStore;
use engine::{EngineStores, PgStore, SequenceEngine, StepDefinition, TriggerType, Worker};
use gateway::{DeliveryGateway, PgDeliveryLog, TracingSink};
use queue::PgQueue;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, LogFormat};

#[derive(Parser)]
#[command(
    name = "outreach",
    about = "Automated customer outreach: message sequences over multi-provider delivery",
    version
)]
struct Cli {
    /// Configuration file.
    #[arg(long, global = true, env = "OUTREACH_CONFIG", default_value = "outreach.toml")]
    config: PathBuf,

    /// Overrides `[database] url`.
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve {
        /// Overrides `[server] bind`.
        #[arg(long)]
        bind: Option<String>,
        /// Also run a queue worker in this process.
        #[arg(long)]
        with_worker: bool,
    },
    /// Start a background worker that processes queued steps.
    Worker,
    /// Run pending database migrations.
    Migrate,
    /// Validate a sequence definition JSON file.
    Validate {
        /// Path to the sequence JSON file.
        path: PathBuf,
    },
    /// Soft-delete completed and failed executions started before the cut-off.
    Prune {
        #[arg(long, default_value_t = 90)]
        older_than_days: u32,
    },
}

/// Shape of a file accepted by `validate`.
#[derive(Deserialize)]
struct SequenceFile {
    name: String,
    trigger_type: TriggerType,
    steps: Vec<StepDefinition>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let (mut config, loaded) = AppConfig::load(&cli.config)?;
    init_tracing(config.log_format);
    if loaded {
        info!("Loaded configuration from {}", cli.config.display());
    } else {
        warn!("{} not found, using defaults", cli.config.display());
    }
    if let Some(url) = cli.database_url {
        config.database.url = Some(url);
    }

    match cli.command {
        Command::Serve { bind, with_worker } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let services = Services::connect(&config).await?;
            let shutdown = shutdown_channel();

            let worker = with_worker.then(|| {
                let worker = services.worker(&config);
                let rx = shutdown.clone();
                tokio::spawn(async move { worker.run(rx).await })
            });

            let state = api::AppState::new(services.engine.clone(), services.gateway.clone(), services.log.clone());
            info!("Starting API server on {bind}");
            api::serve(&bind, state, wait_for(shutdown)).await.context("API server failed")?;

            if let Some(handle) = worker {
                handle.await.context("worker task panicked")?;
            }
        }
        Command::Worker => {
            info!("Starting background worker");
            let services = Services::connect(&config).await?;
            services.worker(&config).run(shutdown_channel()).await;
        }
        Command::Migrate => {
            let pool = connect(&config, 2).await?;
            db::pool::run_migrations(&pool).await.context("migration failed")?;
            info!("Migrations applied successfully");
        }
        Command::Validate { path } => validate(&path)?,
        Command::Prune { older_than_days } => {
            let pool = connect(&config, 2).await?;
            let before = chrono::Utc::now() - chrono::Duration::days(i64::from(older_than_days));
            let removed = PgStore::new(pool).prune_finished(before).await.context("prune failed")?;
            info!("Pruned {} finished execution(s) started before {}", removed, before);
        }
    }
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn validate(path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path).with_context(|| format!("cannot read file {}", path.display()))?;
    let file: SequenceFile = serde_json::from_str(&content).context("invalid JSON")?;

    match engine::validate_sequence(&file.name, &file.steps) {
        Ok(()) => {
            println!(
                "✅ Sequence '{}' ({}) is valid: {} step(s)",
                file.name.trim(),
                file.trigger_type,
                file.steps.len()
            );
            Ok(())
        }
        Err(e) => bail!("❌ Validation failed: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Everything `serve` and `worker` share, backed by one Postgres pool.
struct Services {
    queue: Arc<PgQueue>,
    log: Arc<PgDeliveryLog>,
    gateway: Arc<DeliveryGateway>,
    engine: Arc<SequenceEngine>,
}

impl Services {
    async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let pool = connect(config, config.database.max_connections).await?;
        let sink = Arc::new(TracingSink);

        let log = Arc::new(PgDeliveryLog::new(pool.clone()));
        let gateway = Arc::new(
            DeliveryGateway::from_config(&config.gateway, log.clone(), sink.clone())
                .context("invalid [gateway] configuration")?,
        );
        for channel in [providers::Channel::Whatsapp, providers::Channel::Sms, providers::Channel::Email] {
            let names = gateway.provider_names(channel);
            if !names.is_empty() {
                info!("{} providers in failover order: {}", channel, names.join(", "));
            }
        }

        let queue = Arc::new(PgQueue::new(pool.clone()).with_max_attempts(config.worker.max_job_attempts));
        let engine = Arc::new(SequenceEngine::new(
            EngineStores::shared(Arc::new(PgStore::new(pool))),
            gateway.clone(),
            queue.clone(),
            sink,
            config.engine.clone(),
        ));
        Ok(Self { queue, log, gateway, engine })
    }

    fn worker(&self, config: &AppConfig) -> Worker {
        Worker::new(self.queue.clone(), self.engine.clone(), config.worker.clone())
    }
}

async fn connect(config: &AppConfig, max_connections: u32) -> anyhow::Result<DbPool> {
    let settings = PoolSettings::new(config.database_url()?, max_connections);
    db::pool::create_pool(&settings).await.context("failed to connect to database")
}

/// Flips to `true` on Ctrl-C.
fn shutdown_channel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                let _ = tx.send(true);
            }
            Err(err) => {
                warn!("cannot listen for Ctrl-C: {}", err);
                // Hold the sender: dropping it reads as a shutdown.
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}

async fn wait_for(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
