//! Grid telemetry pipeline: fetch, normalize, spike-clamp, store.

use crate::fetch::grid::{extract_country, GridApi};
use crate::metrics;
use crate::spike::SpikeFilter;
use crate::store::{Country, EnergyStore, GenerationMix, GridField, GridSnapshot, MixField};
use anyhow::{Context, Result};
use chrono::{DateTime, DurationRound, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one grid fetch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridIngestOutcome {
    pub countries: usize,
    /// Fields replaced by the rolling median because the reading was judged
    /// a spike.
    pub clamped_fields: usize,
}

pub struct GridIngestor {
    api: Arc<dyn GridApi>,
    store: Arc<dyn EnergyStore>,
    filter: SpikeFilter,
}

impl GridIngestor {
    pub fn new(api: Arc<dyn GridApi>, store: Arc<dyn EnergyStore>, filter: SpikeFilter) -> Self {
        Self { api, store, filter }
    }

    /// Run one full fetch cycle.
    ///
    /// A transport failure after retries fails the whole cycle with nothing
    /// committed. Spiked fields are clamped to the window median, never
    /// dropped, so the grid series has no silent gaps.
    pub async fn run_once(&self) -> Result<GridIngestOutcome> {
        let doc = match self.api.latest_overview().await {
            Ok(doc) => {
                metrics::record_fetch_outcome("grid", "success");
                doc
            }
            Err(err) => {
                metrics::record_fetch_outcome("grid", "error");
                return Err(err).context("Grid overview fetch failed");
            }
        };

        let timestamp = truncate_to_minute(Utc::now());
        let mut snapshots = Vec::with_capacity(Country::ALL.len());
        let mut mixes = Vec::with_capacity(Country::ALL.len());
        let mut clamped_fields = 0usize;

        for country in Country::ALL {
            let (grid, mix) = extract_country(&doc, country);

            snapshots.push(GridSnapshot {
                timestamp,
                country,
                production: self.filtered_grid(
                    country,
                    GridField::Production,
                    grid.production,
                    &mut clamped_fields,
                )?,
                consumption: self.filtered_grid(
                    country,
                    GridField::Consumption,
                    grid.consumption,
                    &mut clamped_fields,
                )?,
                import_mw: self.filtered_grid(
                    country,
                    GridField::Import,
                    grid.import_mw,
                    &mut clamped_fields,
                )?,
                export_mw: self.filtered_grid(
                    country,
                    GridField::Export,
                    grid.export_mw,
                    &mut clamped_fields,
                )?,
            });

            mixes.push(GenerationMix {
                timestamp,
                country,
                nuclear: self.filtered_mix(
                    country,
                    MixField::Nuclear,
                    mix.nuclear,
                    &mut clamped_fields,
                )?,
                hydro: self.filtered_mix(country, MixField::Hydro, mix.hydro, &mut clamped_fields)?,
                wind: self.filtered_mix(country, MixField::Wind, mix.wind, &mut clamped_fields)?,
                thermal: self.filtered_mix(
                    country,
                    MixField::Thermal,
                    mix.thermal,
                    &mut clamped_fields,
                )?,
                unspecified: self.filtered_mix(
                    country,
                    MixField::Unspecified,
                    mix.unspecified,
                    &mut clamped_fields,
                )?,
            });
        }

        self.store
            .upsert_grid_cycle(&snapshots, &mixes)
            .context("Failed to store grid fetch cycle")?;
        metrics::add_rows_written("grid_snapshots", snapshots.len());
        metrics::add_rows_written("generation_mix", mixes.len());

        info!(
            "Stored grid cycle for {} ({} countries, {} clamped fields)",
            timestamp,
            snapshots.len(),
            clamped_fields
        );
        Ok(GridIngestOutcome {
            countries: snapshots.len(),
            clamped_fields,
        })
    }

    fn filtered_grid(
        &self,
        country: Country,
        field: GridField,
        value: f64,
        clamped: &mut usize,
    ) -> Result<f64> {
        let history = self
            .store
            .recent_grid_values(country, field, self.filter.window())?;
        let series = format!("grid_{}_{}", field.column(), country.code());
        Ok(self.clamp_if_spike(&series, value, &history, clamped))
    }

    fn filtered_mix(
        &self,
        country: Country,
        field: MixField,
        value: f64,
        clamped: &mut usize,
    ) -> Result<f64> {
        let history = self
            .store
            .recent_mix_values(country, field, self.filter.window())?;
        let series = format!("mix_{}_{}", field.column(), country.code());
        Ok(self.clamp_if_spike(&series, value, &history, clamped))
    }

    fn clamp_if_spike(&self, series: &str, value: f64, history: &[f64], clamped: &mut usize) -> f64 {
        let verdict = self.filter.evaluate(value, history);
        if !verdict.is_spike {
            debug!(
                "{}: accepted {} ({})",
                series,
                value,
                verdict.test.as_str()
            );
            metrics::record_spike_decision(series, "accepted");
            return value;
        }

        // Median is always available when the filter had enough history to
        // flag a spike.
        let replacement = verdict.median.unwrap_or(value);
        warn!(
            "{}: spike {} ({}), replacing with window median {}",
            series,
            value,
            verdict.test.as_str(),
            replacement
        );
        metrics::record_spike_decision(series, "clamped");
        *clamped += 1;
        replacement
    }
}

/// Fetch-cycle timestamps are minute resolution.
pub fn truncate_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(chrono::Duration::minutes(1)).unwrap_or(ts)
}
