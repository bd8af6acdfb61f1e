//! grc-resilience
//!
//! Operator binary for the resilience layer.
//!
//! ```text
//!     grc-resilience [--config FILE] run
//!         load config → logging → metrics → context → snapshot reporter
//!         → wait for SIGINT/SIGTERM → stop reporter → exit
//!
//!     grc-resilience [--config FILE] check
//!         load + validate config → print effective settings
//!
//!     grc-resilience [--config FILE] probe URL [--dependency NAME]
//!         one GET through the dependency's breaker and retry policy
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tokio::sync::broadcast;

use grc_resilience::config::{load_config, ResilienceConfig};
use grc_resilience::error::{CircuitOpenError, Classify};
use grc_resilience::lifecycle::{signals, Shutdown};
use grc_resilience::observability::{logging, metrics};
use grc_resilience::resilience::CircuitState;
use grc_resilience::ResilienceContext;

#[derive(Parser)]
#[command(name = "grc-resilience")]
#[command(about = "Resilience layer for GRC platform dependencies", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run until SIGINT/SIGTERM, logging breaker snapshots periodically
    Run,
    /// Validate the configuration and print the effective settings
    Check,
    /// Send one GET request through a dependency's resilient executor
    Probe {
        url: String,

        #[arg(short, long, default_value = "http_probe")]
        dependency: String,
    },
}

/// Failure of a probe request.
#[derive(Debug, Error)]
enum ProbeError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),
}

impl Classify for ProbeError {
    fn code(&self) -> Option<String> {
        match self {
            ProbeError::Http(e) => e.code(),
            ProbeError::CircuitOpen(e) => e.code(),
        }
    }

    fn retryable(&self) -> Option<bool> {
        match self {
            ProbeError::Http(e) => e.retryable(),
            ProbeError::CircuitOpen(e) => e.retryable(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => ResilienceConfig::default(),
    };

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await?,
        Commands::Check => check(&config)?,
        Commands::Probe { url, dependency } => probe(config, &dependency, &url).await?,
    }

    Ok(())
}

async fn run(config: ResilienceConfig) -> Result<(), Box<dyn std::error::Error>> {
    logging::init(&config.observability);
    tracing::info!("grc-resilience v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let interval = Duration::from_secs(config.observability.snapshot_interval_secs.max(1));
    tracing::info!(
        failure_threshold = config.circuit_breaker.defaults.failure_threshold,
        overrides = config.circuit_breaker.overrides.len(),
        retry_max_attempts = config.retry.max_attempts,
        batch_size = config.batch.batch_size,
        snapshot_interval_secs = interval.as_secs(),
        "Configuration loaded"
    );

    let context = ResilienceContext::new(config);
    let shutdown = Shutdown::new();
    let signal_listener = signals::spawn_signal_listener(shutdown.clone());
    let reporter = tokio::spawn(report_snapshots(context.clone(), interval, shutdown.subscribe()));

    shutdown.wait().await;

    if let Err(e) = reporter.await {
        tracing::error!(error = %e, "Snapshot reporter ended abnormally");
    }
    signal_listener.abort();
    log_snapshot(&context);

    tracing::info!("Shutdown complete");
    Ok(())
}

fn check(config: &ResilienceConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", toml::to_string_pretty(config)?);
    println!("# configuration is valid");
    Ok(())
}

async fn probe(config: ResilienceConfig, dependency: &str, url: &str) -> Result<(), Box<dyn std::error::Error>> {
    logging::init(&config.observability);

    let context = ResilienceContext::new(config);
    let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
    let executor = context.executor(dependency);

    let outcome = executor
        .execute(|| async {
            let response = client.get(url).send().await?.error_for_status()?;
            Ok::<_, ProbeError>(response.status())
        })
        .await;

    match outcome {
        Ok(status) => println!("{url} answered {status}"),
        Err(e) => println!("{url} failed: {e}"),
    }
    println!("{}", serde_json::to_string_pretty(&context.snapshot())?);
    Ok(())
}

async fn report_snapshots(context: ResilienceContext, period: Duration, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => log_snapshot(&context),
            _ = shutdown.recv() => break,
        }
    }
}

fn log_snapshot(context: &ResilienceContext) {
    let snapshot = context.snapshot();

    for stats in &snapshot.breakers {
        metrics::record_circuit_state(&stats.name, stats.state);
        if stats.state != CircuitState::Closed {
            tracing::warn!(
                breaker = %stats.name,
                state = %stats.state,
                failure_count = stats.failure_count,
                next_attempt_in_ms = stats.next_attempt_in.map(|d| d.as_millis() as u64),
                "Circuit breaker not closed"
            );
        }
    }

    tracing::info!(
        breakers = snapshot.breakers.len(),
        open = snapshot.open_breakers,
        idempotency_entries = snapshot.idempotency_entries,
        "Resilience snapshot"
    );
}
