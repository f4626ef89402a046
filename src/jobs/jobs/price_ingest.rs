//! Background job wrapping the day-ahead price pipeline.

use crate::ingest::PriceIngestor;
use crate::jobs::{BackgroundJob, JobContext, JobError, JobSchedule};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub struct PriceIngestJob {
    ingestor: Arc<PriceIngestor>,
    interval: Duration,
}

impl PriceIngestJob {
    pub fn new(ingestor: Arc<PriceIngestor>, interval_minutes: u64) -> Self {
        Self {
            ingestor,
            interval: Duration::from_secs(interval_minutes * 60),
        }
    }
}

#[async_trait]
impl BackgroundJob for PriceIngestJob {
    fn id(&self) -> &'static str {
        "price_ingest"
    }

    fn name(&self) -> &'static str {
        "Day-Ahead Price Ingest"
    }

    fn description(&self) -> &'static str {
        "Fetches the day-ahead auction windows for today and tomorrow and stores hourly zone prices"
    }

    fn schedule(&self) -> JobSchedule {
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
    use crate::fetch::prices::DayAheadDocument;
    use crate::fetch::{FetchError, PriceApi};
    use crate::ingest::RefreshRegistry;
    use crate::spike::{SpikeFilter, SpikeFilterSettings};
    use crate::store::SqliteEnergyStore;
    use chrono::NaiveDate;

    struct EmptyPriceApi;

    #[async_trait]
    impl PriceApi for EmptyPriceApi {
        async fn day_ahead(&self, _day: NaiveDate) -> Result<DayAheadDocument, FetchError> {
            Ok(DayAheadDocument {
                multi_area_entries: Vec::new(),
                currency: "EUR".to_string(),
            })
        }
    }

    fn make_job() -> PriceIngestJob {
        let store = Arc::new(SqliteEnergyStore::open_in_memory().unwrap());
        let ingestor = Arc::new(PriceIngestor::new(
            Arc::new(EmptyPriceApi),
            store,
            SpikeFilter::new(SpikeFilterSettings::default()),
            RefreshRegistry::new(),
        ));
        PriceIngestJob::new(ingestor, 60)
    }

    #[test]
    fn test_job_metadata() {
        let job = make_job();
        assert_eq!(job.id(), "price_ingest");
        assert!(!job.description().is_empty());
    }

    #[test]
    fn test_job_schedule() {
        let job = make_job();
        let schedule = job.schedule();
        assert_eq!(schedule.interval, Duration::from_secs(60 * 60));
        assert!(schedule.run_at_startup);
    }
}
