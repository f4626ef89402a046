//! Client and normalization for the day-ahead price feed.
//!
//! The upstream publishes delivery intervals (sub-hourly since the 15-minute
//! market coupling change) with a per-zone price map. Canonical storage is
//! one price per (zone, hour): the first observed value inside each hour
//! wins.

use super::backoff::{fetch_with_retry, FetchError, RetryPolicy};
use super::normalize::parse_value;
use crate::store::{SpotPrice, Zone};
use async_trait::async_trait;
use chrono::{DateTime, DurationRound, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;

/// One day-ahead auction window as delivered by the upstream.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayAheadDocument {
    #[serde(default)]
    pub multi_area_entries: Vec<DeliveryInterval>,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "EUR".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryInterval {
    pub delivery_start: DateTime<Utc>,
    /// Zone code -> price. Values are kept raw because the upstream has
    /// been observed to emit numbers, numeric strings and nulls.
    #[serde(default)]
    pub entry_per_area: serde_json::Map<String, Value>,
}

fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(chrono::Duration::hours(1)).unwrap_or(ts)
}

/// Collapse delivery intervals to one price per (zone, hour), keeping the
/// first observed value per hour. Unknown area codes (system aggregates,
/// non-Nordic zones) are skipped.
pub fn collapse_hourly(doc: &DayAheadDocument) -> Vec<SpotPrice> {
    let mut seen: HashSet<(Zone, DateTime<Utc>)> = HashSet::new();
    let mut prices = Vec::new();

    for interval in &doc.multi_area_entries {
        let hour = truncate_to_hour(interval.delivery_start);
        for (area, raw) in &interval.entry_per_area {
            let Some(zone) = Zone::parse(area) else {
                continue;
            };
            if seen.insert((zone, hour)) {
                prices.push(SpotPrice {
                    timestamp: hour,
                    zone,
                    price: parse_value(Some(raw)),
                    currency: doc.currency.clone(),
                });
            }
        }
    }

    prices
}

/// Upstream day-ahead price feed.
#[async_trait]
pub trait PriceApi: Send + Sync {
    /// The auction window covering the given UTC delivery day.
    async fn day_ahead(&self, day: NaiveDate) -> Result<DayAheadDocument, FetchError>;
}

pub struct HttpPriceApi {
    client: reqwest::Client,
    base_url: String,
    policy: RetryPolicy,
}

impl HttpPriceApi {
    pub fn new(base_url: String, timeout: Duration, policy: RetryPolicy) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            policy,
        }
    }

    fn delivery_areas() -> String {
        Zone::ALL
            .iter()
            .map(|z| z.code())
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[async_trait]
impl PriceApi for HttpPriceApi {
    async fn day_ahead(&self, day: NaiveDate) -> Result<DayAheadDocument, FetchError> {
        let response = fetch_with_retry(&self.policy, || {
            self.client.get(&self.base_url).query(&[
                ("date", day.format("%Y-%m-%d").to_string()),
                ("market", "DayAhead".to_string()),
                ("deliveryArea", Self::delivery_areas()),
                ("currency", "EUR".to_string()),
            ])
        })
        .await?;
        response.json().await.map_err(FetchError::decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn interval(start: DateTime<Utc>, entries: Value) -> DeliveryInterval {
        DeliveryInterval {
            delivery_start: start,
            entry_per_area: entries.as_object().unwrap().clone(),
        }
    }

    fn hour(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 6, h, m, 0).unwrap()
    }

    #[test]
    fn test_document_decodes_from_upstream_shape() {
        let doc: DayAheadDocument = serde_json::from_value(json!({
            "multiAreaEntries": [
                {
                    "deliveryStart": "2026-08-06T10:00:00Z",
                    "deliveryEnd": "2026-08-06T10:15:00Z",
                    "entryPerArea": {"SE3": 50.2, "FI": 61.0}
                }
            ],
            "currency": "EUR"
        }))
        .unwrap();

        assert_eq!(doc.multi_area_entries.len(), 1);
        assert_eq!(doc.currency, "EUR");

        let prices = collapse_hourly(&doc);
        assert_eq!(prices.len(), 2);
    }

    #[test]
    fn test_collapse_keeps_first_value_per_hour() {
        let doc = DayAheadDocument {
            multi_area_entries: vec![
                interval(hour(10, 0), json!({"SE3": 50.0})),
                interval(hour(10, 15), json!({"SE3": 51.0})),
                interval(hour(10, 30), json!({"SE3": 52.0})),
                interval(hour(11, 0), json!({"SE3": 60.0})),
            ],
            currency: "EUR".to_string(),
        };

        let prices = collapse_hourly(&doc);
        assert_eq!(prices.len(), 2);
        assert_eq!(prices[0].timestamp, hour(10, 0));
        assert_eq!(prices[0].price, 50.0);
        assert_eq!(prices[1].timestamp, hour(11, 0));
        assert_eq!(prices[1].price, 60.0);
    }

    #[test]
    fn test_collapse_skips_unknown_areas() {
        let doc = DayAheadDocument {
            multi_area_entries: vec![interval(
                hour(10, 0),
                json!({"SE3": 50.0, "SYS": 48.0, "DE-LU": 80.0}),
            )],
            currency: "EUR".to_string(),
        };

        let prices = collapse_hourly(&doc);
        assert_eq!(prices.len(), 1);
        assert_eq!(prices[0].zone, Zone::Se3);
    }

    #[test]
    fn test_collapse_defensive_price_values() {
        let doc = DayAheadDocument {
            multi_area_entries: vec![interval(
                hour(10, 0),
                json!({"SE1": "45.5", "SE2": null}),
            )],
            currency: "EUR".to_string(),
        };

        let mut prices = collapse_hourly(&doc);
        prices.sort_by_key(|p| p.zone.code());
        assert_eq!(prices.len(), 2);
        assert_eq!(prices[0].price, 45.5);
        assert_eq!(prices[1].price, 0.0);
    }

    #[test]
    fn test_collapse_empty_document() {
        let doc = DayAheadDocument {
            multi_area_entries: vec![],
            currency: "EUR".to_string(),
        };
        assert!(collapse_hourly(&doc).is_empty());
    }
}
