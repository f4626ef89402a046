//! Background job purging time-series rows past the retention window.

use crate::jobs::{BackgroundJob, JobContext, JobError, JobSchedule};
use crate::metrics;
use crate::store::EnergyStore;
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tracing::info;

pub struct RetentionCleanupJob {
    retention_days: u64,
    interval: Duration,
}

impl RetentionCleanupJob {
    pub fn new(retention_days: u64, interval_hours: u64) -> Self {
        Self {
            retention_days,
            interval: Duration::from_secs(interval_hours * 60 * 60),
        }
    }
}

#[async_trait]
impl BackgroundJob for RetentionCleanupJob {
    fn id(&self) -> &'static str {
        "retention_cleanup"
    }

    fn name(&self) -> &'static str {
        "Retention Cleanup"
    }

    fn description(&self) -> &'static str {
        "Deletes grid, mix and price rows older than the retention window"
    }

    fn schedule(&self) -> JobSchedule {
        // Sweeps only on the daily cadence, never at process start.
        JobSchedule::every(self.interval)
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        let cutoff = Utc::now() - chrono::Duration::days(self.retention_days as i64);
        let report = ctx
            .store
            .delete_older_than(cutoff)
            .map_err(|e| JobError::ExecutionFailed(format!("{:#}", e)))?;

        metrics::add_rows_purged("grid_snapshots", report.grid_rows);
        metrics::add_rows_purged("generation_mix", report.mix_rows);
        metrics::add_rows_purged("spot_prices", report.price_rows);

        if report.total() > 0 {
            info!(
                "Retention sweep removed {} rows (grid={}, mix={}, price={}) older than {}",
                report.total(),
                report.grid_rows,
                report.mix_rows,
                report.price_rows,
                cutoff
            );
        }
        Ok(())
    }
}
