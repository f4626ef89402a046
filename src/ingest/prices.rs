//! Day-ahead price pipeline: fetch both auction windows, collapse to hourly
//! points, drop spikes, store.

use super::refresh::RefreshRegistry;
use crate::fetch::prices::{collapse_hourly, DayAheadDocument, PriceApi};
use crate::fetch::FetchError;
use crate::metrics;
use crate::spike::SpikeFilter;
use crate::store::{EnergyStore, SpotPrice, Zone};
use anyhow::{Context, Result};
use chrono::{Days, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Refresh key guarding on-demand day-ahead refreshes.
pub const PRICE_REFRESH_KEY: &str = "day_ahead_prices";

/// Result of one price fetch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceIngestOutcome {
    pub stored: usize,
    /// Points omitted because the reading was judged a spike. A gap is
    /// preferable to propagating a bad price signal downstream.
    pub dropped: usize,
}

/// Outcome of an on-demand freshness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Today's prices were already stored; nothing was fetched.
    Fresh,
    /// This caller won the refresh and fetched upstream.
    Refreshed(PriceIngestOutcome),
    /// Another refresh was in flight; no action taken.
    RefreshInFlight,
}

pub struct PriceIngestor {
    api: Arc<dyn PriceApi>,
    store: Arc<dyn EnergyStore>,
    filter: SpikeFilter,
    refreshes: RefreshRegistry,
}

impl PriceIngestor {
    pub fn new(
        api: Arc<dyn PriceApi>,
        store: Arc<dyn EnergyStore>,
        filter: SpikeFilter,
        refreshes: RefreshRegistry,
    ) -> Self {
        Self {
            api,
            store,
            filter,
            refreshes,
        }
    }

    /// Fetch the auction windows covering today and tomorrow and store one
    /// price per (zone, hour). All surviving points commit in a single
    /// transaction.
    pub async fn run_once(&self) -> Result<PriceIngestOutcome> {
        let today = Utc::now().date_naive();
        let tomorrow = today + Days::new(1);

        let mut collapsed = Vec::new();
        collapsed.extend(collapse_hourly(&self.fetch_window(today, true).await?));
        collapsed.extend(collapse_hourly(&self.fetch_window(tomorrow, false).await?));

        let mut kept: Vec<SpotPrice> = Vec::with_capacity(collapsed.len());
        let mut dropped = 0usize;
        for price in collapsed {
            let history = self
                .store
                .recent_prices(price.zone, self.filter.window())?;
            let verdict = self.filter.evaluate(price.price, &history);
            let series = format!("price_{}", price.zone.code());
            if verdict.is_spike {
                warn!(
                    "{}: spike {} at {} ({}), dropping point",
                    series,
                    price.price,
                    price.timestamp,
                    verdict.test.as_str()
                );
                metrics::record_spike_decision(&series, "dropped");
                dropped += 1;
            } else {
                metrics::record_spike_decision(&series, "accepted");
                kept.push(price);
            }
        }

        let stored = self
            .store
            .upsert_prices(&kept)
            .context("Failed to store price fetch cycle")?;
        metrics::add_rows_written("spot_prices", stored);

        info!(
            "Stored {} day-ahead prices ({} spikes dropped)",
            stored, dropped
        );
        Ok(PriceIngestOutcome { stored, dropped })
    }

    /// Answer "do we have today's prices yet?", refreshing at most once
    /// across all concurrent callers. Lock contention is not an error: the
    /// loser proceeds with whatever data currently exists.
    pub async fn ensure_today(&self) -> Result<Freshness> {
        let today = Utc::now().date_naive();
        if self.has_full_coverage(today)? {
            return Ok(Freshness::Fresh);
        }

        match self.refreshes.try_acquire(PRICE_REFRESH_KEY) {
            Some(_guard) => {
                debug!("Day-ahead coverage incomplete for {}, refreshing", today);
                let outcome = self.run_once().await?;
                Ok(Freshness::Refreshed(outcome))
            }
            None => {
                debug!("Day-ahead refresh already in flight, skipping");
                Ok(Freshness::RefreshInFlight)
            }
        }
    }

    fn has_full_coverage(&self, day: NaiveDate) -> Result<bool> {
        for zone in Zone::ALL {
            if self.store.count_prices_for_day(zone, day)? == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Today's window must exist; tomorrow's auction may simply not have
    /// been published yet, which the upstream reports as an empty status.
    async fn fetch_window(&self, day: NaiveDate, required: bool) -> Result<DayAheadDocument> {
        match self.api.day_ahead(day).await {
            Ok(doc) => {
                metrics::record_fetch_outcome("prices", "success");
                Ok(doc)
            }
            Err(FetchError::Status(code))
                if !required && (code.as_u16() == 404 || code.as_u16() == 204) =>
            {
                debug!("Day-ahead window for {} not published yet", day);
                metrics::record_fetch_outcome("prices", "not_published");
                Ok(DayAheadDocument {
                    multi_area_entries: Vec::new(),
                    currency: "EUR".to_string(),
                })
            }
            Err(err) => {
                metrics::record_fetch_outcome("prices", "error");
                Err(err).with_context(|| format!("Day-ahead fetch failed for {}", day))
            }
        }
    }
}
