//! Quote Pipeline Binary
//!
//! Reads upstream quote payloads (JSON lines on stdin and, when configured,
//! polled from the upstream provider), consumes them into the point store and
//! writes SMA aggregates on a fixed cadence.
//!
//! # Usage
//!
//! ```bash
//! cat quotes.jsonl | cargo run --bin quote-pipeline
//! ```
//!
//! # Environment Variables
//!
//! - `QUOTE_PIPELINE_CONFIG`: Path to the YAML config (default: config.yaml if present)
//! - `UPSTREAM_API_KEY`: Upstream API key, required when `upstream.pairs` is set
//!   (the variable name is configurable under `credentials.secret_env_var`)
//! - `RUST_LOG`: Log filter, overrides `observability.logging.level`

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use quote_pipeline::application::ports::SecretSourcePort;
use quote_pipeline::application::services::CredentialCache;
use quote_pipeline::application::use_cases::{
    AggregateQuotesUseCase, BisectingConsumer, ConsumeStreamUseCase, ConsumerSettings,
    IngestQuotesUseCase,
};
use quote_pipeline::config::{CONFIG_PATH_ENV, Config, ConfigError, load_config};
use quote_pipeline::domain::shared::SecretId;
use quote_pipeline::infrastructure::persistence::InMemoryPointStore;
use quote_pipeline::infrastructure::secrets::EnvSecretSource;
use quote_pipeline::infrastructure::sink::ArrowIpcSink;
use quote_pipeline::infrastructure::source::{ingest_json_lines, poll_upstream};
use quote_pipeline::infrastructure::transport::InMemoryStreamTransport;
use quote_pipeline::infrastructure::upstream::{HttpUpstreamConfig, HttpUpstreamQuotes};
use quote_pipeline::observability::{
    LogFormat, MetricsConfig, TracingConfig, init_metrics, init_tracing,
};
use quote_pipeline::scheduler::AggregationScheduler;
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default config file, used only when it exists.
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

type Ingest = IngestQuotesUseCase<InMemoryStreamTransport>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let config = read_config()?;
    init_observability(&config)?;

    tracing::info!(
        windows = ?config.aggregation.windows,
        field = %config.aggregation.field,
        cadence_secs = config.scheduler.cadence_secs,
        output = %config.output.root_dir.display(),
        "Starting quote pipeline"
    );

    let store = Arc::new(InMemoryPointStore::new());
    let transport = Arc::new(InMemoryStreamTransport::new());
    let sink = Arc::new(ArrowIpcSink::new(
        config.output.root_dir.clone(),
        config.output.granularity,
    ));

    let rules = config.consumer.rules();
    let policy = config.retry.to_policy();
    let timeout = config.storage.operation_timeout();

    let ingest = Arc::new(create_ingest(&config, Arc::clone(&transport))?);

    let consumer = BisectingConsumer::new(Arc::clone(&store), rules, policy.clone(), timeout);
    let consume = Arc::new(ConsumeStreamUseCase::new(
        Arc::clone(&transport),
        consumer,
        ConsumerSettings {
            batch_size: config.consumer.batch_size,
            poll_interval: config.consumer.poll_interval(),
            operation_timeout: timeout,
        },
    ));

    let aggregate = Arc::new(AggregateQuotesUseCase::new(
        Arc::clone(&store),
        sink,
        config.aggregation.to_settings(timeout)?,
        policy,
    ));
    let scheduler = AggregationScheduler::new(aggregate, config.scheduler.cadence())
        .with_run_on_start(config.scheduler.run_on_start);

    let shutdown = CancellationToken::new();
    let mut tasks = JoinSet::new();

    tasks.spawn(Arc::clone(&consume).run(shutdown.clone()));
    tasks.spawn({
        let cancel = shutdown.clone();
        async move { scheduler.run(cancel).await }
    });
    tasks.spawn(read_stdin(Arc::clone(&ingest), shutdown.clone()));

    let pairs = config.upstream.currency_pairs();
    if !pairs.is_empty() {
        let interval = Duration::from_secs(config.upstream.poll_interval_secs.max(1));
        let cancel = shutdown.clone();
        let ingest = Arc::clone(&ingest);
        tracing::info!(pairs = ?pairs, interval_secs = interval.as_secs(), "Polling upstream");
        tasks.spawn(async move {
            let stats = poll_upstream(ingest.as_ref(), &pairs, interval, &cancel).await;
            tracing::info!(?stats, "Upstream poller stopped");
        });
    }

    tracing::info!("Quote pipeline ready");

    shutdown_signal().await;
    shutdown.cancel();

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Task panicked during shutdown");
            }
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Shutdown timed out, aborting remaining tasks"
        );
        tasks.abort_all();
    }

    tracing::info!("Quote pipeline stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Read the config named by `QUOTE_PIPELINE_CONFIG`, else `config.yaml`
/// when present, else defaults.
fn read_config() -> Result<Config, ConfigError> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return load_config(Some(&path));
    }
    if Path::new(DEFAULT_CONFIG_PATH).exists() {
        return load_config(None);
    }
    Ok(Config::default())
}

fn init_observability(config: &Config) -> anyhow::Result<()> {
    let logging = &config.observability.logging;
    let format: LogFormat = logging.format.parse()?;
    init_tracing(&TracingConfig::new(logging.level.clone(), format))?;

    let metrics = &config.observability.metrics;
    if metrics.enabled {
        init_metrics(&MetricsConfig::with_addr(metrics.listen_addr))
            .context("failed to start metrics exporter")?;
    }
    Ok(())
}

/// Build the ingest use case, attaching the upstream provider when pairs
/// are configured.
fn create_ingest(config: &Config, transport: Arc<InMemoryStreamTransport>) -> anyhow::Result<Ingest> {
    let ingest = IngestQuotesUseCase::new(
        transport,
        config.consumer.rules(),
        config.retry.to_policy(),
        config.storage.operation_timeout(),
    );
    if config.upstream.currency_pairs().is_empty() {
        return Ok(ingest);
    }

    let secret_var = &config.credentials.secret_env_var;
    if !std::env::var(secret_var).is_ok_and(|v| !v.trim().is_empty()) {
        return Err(ConfigError::MissingEnvVar(secret_var.clone()).into());
    }

    let provider = HttpUpstreamQuotes::new(&HttpUpstreamConfig {
        base_url: config.upstream.base_url.clone(),
        timeout: Duration::from_millis(config.upstream.request_timeout_ms),
    })?;
    let source: Arc<dyn SecretSourcePort> = Arc::new(EnvSecretSource::new());
    let credentials = Arc::new(CredentialCache::new(
        source,
        SecretId::new(secret_var.as_str()),
        config.credentials.ttl(),
    ));

    Ok(ingest.with_upstream(Arc::new(provider), credentials))
}

/// Ingest JSON lines from stdin until EOF or shutdown.
async fn read_stdin(ingest: Arc<Ingest>, cancel: CancellationToken) {
    let reader = tokio::io::BufReader::new(tokio::io::stdin());
    match ingest_json_lines(reader, ingest.as_ref(), &cancel).await {
        Ok(stats) => tracing::info!(?stats, "Finished reading stdin"),
        Err(e) => tracing::error!(error = %e, "Failed to read stdin"),
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
