//! Durable storage for the three time-series domains, the shared key-value
//! cache, and background-job bookkeeping.
//!
//! Everything is keyed for idempotent upsert: re-ingesting a fetch cycle for
//! an already-stored timestamp replaces rows instead of duplicating them.

mod migrations;
mod models;
mod schema;
mod sqlite_store;

pub use models::{
    Country, ExchangeRateSet, GenerationMix, GridField, GridSnapshot, JobRun, JobRunStatus,
    JobScheduleState, MixField, RetentionReport, SpotPrice, Zone,
};
pub use schema::TARGET_VERSION;
pub use sqlite_store::SqliteEnergyStore;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};

/// Storage interface consumed by the ingestion pipelines, the scheduler and
/// the (out-of-repo) read layer.
pub trait EnergyStore: Send + Sync {
    // ---------------------------------------------------------------------
    // Time-series writes
    // ---------------------------------------------------------------------

    /// Upsert one fetch cycle's grid snapshots and generation mixes in a
    /// single transaction. A partial upstream failure never leaves the
    /// store half-updated for the cycle.
    fn upsert_grid_cycle(&self, snapshots: &[GridSnapshot], mixes: &[GenerationMix]) -> Result<()>;

    /// Upsert a batch of hourly spot prices in a single transaction.
    /// Returns the number of rows written.
    fn upsert_prices(&self, prices: &[SpotPrice]) -> Result<usize>;

    // ---------------------------------------------------------------------
    // Spike-filter history windows (newest first)
    // ---------------------------------------------------------------------

    fn recent_grid_values(&self, country: Country, field: GridField, limit: usize)
        -> Result<Vec<f64>>;

    fn recent_mix_values(&self, country: Country, field: MixField, limit: usize)
        -> Result<Vec<f64>>;

    fn recent_prices(&self, zone: Zone, limit: usize) -> Result<Vec<f64>>;

    // ---------------------------------------------------------------------
    // Read-side queries (range scans and latest rows; readers never write)
    // ---------------------------------------------------------------------

    fn grid_history(&self, country: Country, since: DateTime<Utc>) -> Result<Vec<GridSnapshot>>;

    fn mix_history(&self, country: Country, since: DateTime<Utc>) -> Result<Vec<GenerationMix>>;

    fn price_history(&self, zone: Zone, since: DateTime<Utc>) -> Result<Vec<SpotPrice>>;

    fn latest_snapshot(&self, country: Country) -> Result<Option<GridSnapshot>>;

    fn latest_mix(&self, country: Country) -> Result<Option<GenerationMix>>;

    /// Number of stored price hours for a zone on a given UTC day. Used as
    /// the freshness probe for the day-ahead coverage check.
    fn count_prices_for_day(&self, zone: Zone, day: NaiveDate) -> Result<usize>;

    // ---------------------------------------------------------------------
    // Shared key-value state
    // ---------------------------------------------------------------------

    fn get_state(&self, key: &str) -> Result<Option<String>>;

    fn set_state(&self, key: &str, value: &str) -> Result<()>;

    fn delete_state(&self, key: &str) -> Result<()>;

    /// Read the shared exchange-rate set. Always goes through durable
    /// storage so independently scheduled workers observe one value.
    fn load_exchange_rates(&self) -> Result<Option<ExchangeRateSet>> {
        match self.get_state(ExchangeRateSet::STATE_KEY)? {
            Some(raw) => {
                let set = serde_json::from_str(&raw)
                    .context("Failed to decode stored exchange rates")?;
                Ok(Some(set))
            }
            None => Ok(None),
        }
    }

    /// Replace the shared exchange-rate set wholesale.
    fn store_exchange_rates(&self, rates: &ExchangeRateSet) -> Result<()> {
        let raw = serde_json::to_string(rates).context("Failed to encode exchange rates")?;
        self.set_state(ExchangeRateSet::STATE_KEY, &raw)
    }

    // ---------------------------------------------------------------------
    // Retention
    // ---------------------------------------------------------------------

    /// Delete time-series rows older than the cutoff from all three tables.
    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<RetentionReport>;

    // ---------------------------------------------------------------------
    // Job observability
    // ---------------------------------------------------------------------

    fn record_job_start(&self, job_id: &str, triggered_by: &str) -> Result<i64>;

    fn record_job_finish(
        &self,
        run_id: i64,
        status: JobRunStatus,
        error_message: Option<String>,
    ) -> Result<()>;

    fn get_job_history(&self, job_id: &str, limit: usize) -> Result<Vec<JobRun>>;

    fn get_last_run(&self, job_id: &str) -> Result<Option<JobRun>>;

    /// Mark runs left in "running" state by a previous process as failed.
    /// Called once at scheduler startup.
    fn mark_stale_jobs_failed(&self) -> Result<usize>;

    fn get_schedule_state(&self, job_id: &str) -> Result<Option<JobScheduleState>>;

    fn update_schedule_state(&self, state: &JobScheduleState) -> Result<()>;
}
