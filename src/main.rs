use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gridwatt::config::{self, AppConfig, CliConfig, FileConfig};
use gridwatt::fetch::{HttpGridApi, HttpPriceApi, HttpRatesApi, RetryPolicy};
use gridwatt::ingest::{GridIngestor, PriceIngestor, RateIngestor, RefreshRegistry};
use gridwatt::jobs::jobs::{
    ExchangeRatesJob, GridIngestJob, PriceIngestJob, RetentionCleanupJob,
};
use gridwatt::jobs::{JobContext, JobScheduler};
use gridwatt::metrics;
use gridwatt::spike::SpikeFilter;
use gridwatt::store::{EnergyStore, SqliteEnergyStore};

#[derive(Parser, Debug)]
#[clap(name = "gridwatt", about = "Nordic energy telemetry ingestion service")]
struct CliArgs {
    /// Directory holding the SQLite energy database.
    #[clap(long)]
    pub db_dir: Option<PathBuf>,

    /// Path to an optional TOML config file. File values override CLI flags.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// URL of the grid production/consumption overview feed.
    #[clap(long, default_value = config::DEFAULT_GRID_URL)]
    pub grid_url: String,

    /// URL of the day-ahead price feed.
    #[clap(long, default_value = config::DEFAULT_PRICE_URL)]
    pub price_url: String,

    /// URL of the EUR-base exchange-rate feed.
    #[clap(long, default_value = config::DEFAULT_RATES_URL)]
    pub rates_url: String,

    /// Per-request timeout in seconds for upstream fetches.
    #[clap(long, default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Minutes between grid telemetry fetches.
    #[clap(long, default_value_t = 5)]
    pub grid_interval_minutes: u64,

    /// Minutes between day-ahead price fetches.
    #[clap(long, default_value_t = 60)]
    pub price_interval_minutes: u64,

    /// Hours between exchange-rate fetches.
    #[clap(long, default_value_t = 6)]
    pub rates_interval_hours: u64,

    /// Hours between retention sweeps.
    #[clap(long, default_value_t = 24)]
    pub cleanup_interval_hours: u64,

    /// Days of time-series data to retain.
    #[clap(long, default_value_t = 200)]
    pub retention_days: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_dir: cli_args.db_dir,
        grid_url: cli_args.grid_url,
        price_url: cli_args.price_url,
        rates_url: cli_args.rates_url,
        request_timeout_secs: cli_args.request_timeout_secs,
        grid_interval_minutes: cli_args.grid_interval_minutes,
        price_interval_minutes: cli_args.price_interval_minutes,
        rates_interval_hours: cli_args.rates_interval_hours,
        cleanup_interval_hours: cli_args.cleanup_interval_hours,
        retention_days: cli_args.retention_days,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    metrics::init_metrics();

    info!(
        "Opening SQLite energy database at {:?}...",
        config.energy_db_path()
    );
    // Migration failure is fatal: the process must not serve from a store
    // it could not bring to the target schema version.
    let store: Arc<dyn EnergyStore> = Arc::new(
        SqliteEnergyStore::open(config.energy_db_path())
            .context("Storage could not reach the target schema version")?,
    );

    let policy = RetryPolicy::from_settings(&config.retry);
    let timeout = config.request_timeout();
    let grid_api = Arc::new(HttpGridApi::new(
        config.grid_url.clone(),
        timeout,
        policy.clone(),
    ));
    let price_api = Arc::new(HttpPriceApi::new(
        config.price_url.clone(),
        timeout,
        policy.clone(),
    ));
    let rates_api = Arc::new(HttpRatesApi::new(config.rates_url.clone(), timeout, policy));

    let filter = SpikeFilter::new(config.spike.clone());
    let grid_ingestor = Arc::new(GridIngestor::new(grid_api, store.clone(), filter.clone()));
    let price_ingestor = Arc::new(PriceIngestor::new(
        price_api,
        store.clone(),
        filter,
        RefreshRegistry::new(),
    ));
    let rate_ingestor = Arc::new(RateIngestor::new(rates_api, store.clone()));

    let shutdown_token = CancellationToken::new();
    let job_context = JobContext::new(shutdown_token.child_token(), store.clone());
    let mut scheduler = JobScheduler::new(store, shutdown_token.clone(), job_context);
    scheduler.register_job(Arc::new(GridIngestJob::new(
        grid_ingestor,
        config.grid_interval_minutes,
    )));
    scheduler.register_job(Arc::new(PriceIngestJob::new(
        price_ingestor,
        config.price_interval_minutes,
    )));
    scheduler.register_job(Arc::new(ExchangeRatesJob::new(
        rate_ingestor,
        config.rates_interval_hours,
    )));
    scheduler.register_job(Arc::new(RetentionCleanupJob::new(
        config.retention_days,
        config.cleanup_interval_hours,
    )));

    info!(
        "Ingestion service ready ({} jobs registered)",
        scheduler.job_count()
    );
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run().await;
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");
    shutdown_token.cancel();
    let _ = scheduler_handle.await;

    Ok(())
}
