//! Background job wrapping the exchange-rate pipeline.

use crate::ingest::RateIngestor;
use crate::jobs::{BackgroundJob, JobContext, JobError, JobSchedule};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub struct ExchangeRatesJob {
    ingestor: Arc<RateIngestor>,
    interval: Duration,
}

impl ExchangeRatesJob {
    pub fn new(ingestor: Arc<RateIngestor>, interval_hours: u64) -> Self {
        Self {
            ingestor,
            interval: Duration::from_secs(interval_hours * 60 * 60),
        }
    }
}

#[async_trait]
impl BackgroundJob for ExchangeRatesJob {
    fn id(&self) -> &'static str {
        "exchange_rates"
    }

    fn name(&self) -> &'static str {
        "Exchange Rate Refresh"
    }

    fn description(&self) -> &'static str {
        "Fetches EUR-base exchange rates and replaces the shared rate set"
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
