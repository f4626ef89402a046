//! Exchange-rate pipeline: fetch EUR-base rates and replace the shared
//! key-value row wholesale.
//!
//! The stored set is the only copy: sibling worker processes read it back
//! through storage on every use, so a refresh is immediately visible to all
//! of them.

use crate::fetch::rates::RatesApi;
use crate::metrics;
use crate::store::{EnergyStore, ExchangeRateSet};
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

pub struct RateIngestor {
    api: Arc<dyn RatesApi>,
    store: Arc<dyn EnergyStore>,
}

impl RateIngestor {
    pub fn new(api: Arc<dyn RatesApi>, store: Arc<dyn EnergyStore>) -> Self {
        Self { api, store }
    }

    /// Fetch and persist a fresh rate set. On any failure the previously
    /// stored set stays in effect.
    pub async fn run_once(&self) -> Result<ExchangeRateSet> {
        let doc = match self.api.eur_rates().await {
            Ok(doc) => {
                metrics::record_fetch_outcome("rates", "success");
                doc
            }
            Err(err) => {
                metrics::record_fetch_outcome("rates", "error");
                return Err(err).context("Exchange-rate fetch failed");
            }
        };

        let rates = doc
            .into_rate_set(Utc::now())
            .context("Exchange-rate payload incomplete")?;
        self.store
            .store_exchange_rates(&rates)
            .context("Failed to store exchange rates")?;

        info!(
            "Stored exchange rates: SEK={} DKK={} NOK={}",
            rates.sek, rates.dkk, rates.nok
        );
        Ok(rates)
    }
}
