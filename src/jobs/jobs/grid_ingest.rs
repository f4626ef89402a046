//! Background job wrapping the grid telemetry pipeline.

use crate::ingest::GridIngestor;
use crate::jobs::{BackgroundJob, JobContext, JobError, JobSchedule};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub struct GridIngestJob {
    ingestor: Arc<GridIngestor>,
    interval: Duration,
}

impl GridIngestJob {
    pub fn new(ingestor: Arc<GridIngestor>, interval_minutes: u64) -> Self {
        Self {
            ingestor,
            interval: Duration::from_secs(interval_minutes * 60),
        }
    }
}

#[async_trait]
impl BackgroundJob for GridIngestJob {
    fn id(&self) -> &'static str {
        "grid_ingest"
    }

    fn name(&self) -> &'static str {
        "Grid Telemetry Ingest"
    }

    fn description(&self) -> &'static str {
        "Fetches the grid production/consumption overview and stores one snapshot per country"
    }

    fn schedule(&self) -> JobSchedule {
        // First snapshot lands right at startup, not after a full interval.
        JobSchedule::every_from_startup(self.interval)
    }

    async fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
        self.ingestor
            .run_once()
            .await
            .map(|_| ())
            .map_err(|e| JobError::ExecutionFailed(format!("{:#}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchError, GridApi};
    use crate::spike::{SpikeFilter, SpikeFilterSettings};
    use crate::store::SqliteEnergyStore;
    use serde_json::{json, Value};

    struct EmptyGridApi;

    #[async_trait]
    impl GridApi for EmptyGridApi {
        async fn latest_overview(&self) -> Result<Value, FetchError> {
            Ok(json!({}))
        }
    }

    fn make_job() -> GridIngestJob {
        let store = Arc::new(SqliteEnergyStore::open_in_memory().unwrap());
        let ingestor = Arc::new(GridIngestor::new(
            Arc::new(EmptyGridApi),
            store,
            SpikeFilter::new(SpikeFilterSettings::default()),
        ));
        GridIngestJob::new(ingestor, 5)
    }

    #[test]
    fn test_job_metadata() {
        let job = make_job();
        assert_eq!(job.id(), "grid_ingest");
        assert!(!job.description().is_empty());
    }

    #[test]
    fn test_job_schedule() {
        let job = make_job();
        let schedule = job.schedule();
        assert_eq!(schedule.interval, Duration::from_secs(5 * 60));
        assert!(schedule.run_at_startup);
    }
}
