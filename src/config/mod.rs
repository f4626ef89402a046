mod file_config;

pub use file_config::FileConfig;

use crate::spike::SpikeFilterSettings;
use anyhow::{bail, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_GRID_URL: &str =
    "https://driftsdata.statnett.no/restapi/ProductionConsumption/GetLatestDetailedOverview";
pub const DEFAULT_PRICE_URL: &str =
    "https://dataportal-api.nordpoolgroup.com/api/DayAheadPrices";
pub const DEFAULT_RATES_URL: &str = "https://api.frankfurter.app/latest?from=EUR&to=SEK,DKK,NOK";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub grid_url: String,
    pub price_url: String,
    pub rates_url: String,
    pub request_timeout_secs: u64,
    pub grid_interval_minutes: u64,
    pub price_interval_minutes: u64,
    pub rates_interval_hours: u64,
    pub cleanup_interval_hours: u64,
    pub retention_days: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            db_dir: None,
            grid_url: DEFAULT_GRID_URL.to_string(),
            price_url: DEFAULT_PRICE_URL.to_string(),
            rates_url: DEFAULT_RATES_URL.to_string(),
            request_timeout_secs: 30,
            grid_interval_minutes: 5,
            price_interval_minutes: 60,
            rates_interval_hours: 6,
            cleanup_interval_hours: 24,
            retention_days: 200,
        }
    }
}

/// Retry/backoff knobs for the shared fetch primitive.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            multiplier: 2.0,
            jitter: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub grid_url: String,
    pub price_url: String,
    pub rates_url: String,
    pub request_timeout_secs: u64,

    // Cadences
    pub grid_interval_minutes: u64,
    pub price_interval_minutes: u64,
    pub rates_interval_hours: u64,
    pub cleanup_interval_hours: u64,
    pub retention_days: u64,

    // Feature configs (with defaults)
    pub retry: RetrySettings,
    pub spike: SpikeFilterSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        Ok(Self {
            db_dir,
            grid_url: file.grid_url.unwrap_or_else(|| cli.grid_url.clone()),
            price_url: file.price_url.unwrap_or_else(|| cli.price_url.clone()),
            rates_url: file.rates_url.unwrap_or_else(|| cli.rates_url.clone()),
            request_timeout_secs: file
                .request_timeout_secs
                .unwrap_or(cli.request_timeout_secs),
            grid_interval_minutes: file
                .grid_interval_minutes
                .unwrap_or(cli.grid_interval_minutes),
            price_interval_minutes: file
                .price_interval_minutes
                .unwrap_or(cli.price_interval_minutes),
            rates_interval_hours: file
                .rates_interval_hours
                .unwrap_or(cli.rates_interval_hours),
            cleanup_interval_hours: file
                .cleanup_interval_hours
                .unwrap_or(cli.cleanup_interval_hours),
            retention_days: file.retention_days.unwrap_or(cli.retention_days),
            retry: file.retry.unwrap_or_default(),
            spike: file.spike.unwrap_or_default(),
        })
    }

    pub fn energy_db_path(&self) -> PathBuf {
        self.db_dir.join("energy.db")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
