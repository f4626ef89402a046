//! Client and field extraction for the grid telemetry overview feed.
//!
//! The upstream document is a JSON object with one named array per series
//! ("ConsumptionData", "ProductionData", per-fuel arrays, ...). Each array
//! element carries a translation identifier and a value; one element per
//! country is looked up by a deterministic identifier pattern.

use super::backoff::{fetch_with_retry, FetchError, RetryPolicy};
use super::normalize::{kw_to_mw, parse_value, pick_entry, split_net_exchange};
use crate::store::Country;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::time::Duration;

const ID_FIELD: &str = "titleTranslationId";

/// Normalized production/consumption fields for one country, MW.
#[derive(Debug, Clone, PartialEq)]
pub struct GridReading {
    pub production: f64,
    pub consumption: f64,
    pub import_mw: f64,
    pub export_mw: f64,
}

/// Normalized per-fuel generation fields for one country, MW.
#[derive(Debug, Clone, PartialEq)]
pub struct MixReading {
    pub nuclear: f64,
    pub hydro: f64,
    pub wind: f64,
    pub thermal: f64,
    pub unspecified: f64,
}

fn series_pattern(series: &str, country: Country) -> Regex {
    Regex::new(&format!(
        r"^ProductionConsumption\.{}{}Desc$",
        series,
        country.code()
    ))
    .expect("series identifier pattern is valid")
}

/// Extract one country's grid and mix readings from the overview document.
/// Missing or malformed fields come back as 0.0 and never fail the cycle.
pub fn extract_country(doc: &Value, country: Country) -> (GridReading, MixReading) {
    let value = |array: &str, series: &str| -> f64 {
        let pattern = series_pattern(series, country);
        parse_value(pick_entry(doc.get(array), ID_FIELD, &pattern).and_then(|e| e.get("value")))
    };

    let (import_mw, export_mw) = split_net_exchange(value("NetExchangeData", "NetExchange"));
    let grid = GridReading {
        production: kw_to_mw(value("ProductionData", "Production")),
        consumption: kw_to_mw(value("ConsumptionData", "Consumption")),
        import_mw,
        export_mw,
    };
    let mix = MixReading {
        nuclear: kw_to_mw(value("NuclearData", "Nuclear")),
        hydro: kw_to_mw(value("HydroData", "Hydro")),
        wind: kw_to_mw(value("WindData", "Wind")),
        thermal: kw_to_mw(value("ThermalData", "Thermal")),
        unspecified: kw_to_mw(value("NotSpecifiedData", "NotSpecified")),
    };
    (grid, mix)
}

/// Upstream grid telemetry feed.
#[async_trait]
pub trait GridApi: Send + Sync {
    /// Latest detailed production/consumption overview document.
    async fn latest_overview(&self) -> Result<Value, FetchError>;
}

/// HTTP implementation backed by the shared retry primitive.
pub struct HttpGridApi {
    client: reqwest::Client,
    url: String,
    policy: RetryPolicy,
}

impl HttpGridApi {
    pub fn new(url: String, timeout: Duration, policy: RetryPolicy) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            url,
            policy,
        }
    }
}

#[async_trait]
impl GridApi for HttpGridApi {
    async fn latest_overview(&self) -> Result<Value, FetchError> {
        let response = fetch_with_retry(&self.policy, || self.client.get(&self.url)).await?;
        response.json().await.map_err(FetchError::decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(id: &str, value: Value) -> Value {
        json!({"titleTranslationId": id, "value": value})
    }

    #[test]
    fn test_extract_country_happy_path() {
        let doc = json!({
            "ProductionData": [
                entry("ProductionConsumption.ProductionSEDesc", json!(20000)),
                entry("ProductionConsumption.ProductionNODesc", json!(18000)),
            ],
            "ConsumptionData": [
                entry("ProductionConsumption.ConsumptionSEDesc", json!("21\u{a0}500")),
            ],
            "NetExchangeData": [
                entry("ProductionConsumption.NetExchangeSEDesc", json!(-1500)),
            ],
            "NuclearData": [
                entry("ProductionConsumption.NuclearSEDesc", json!(6000)),
            ],
            "HydroData": [
                entry("ProductionConsumption.HydroSEDesc", json!(9000)),
            ],
            "WindData": [
                entry("ProductionConsumption.WindSEDesc", json!(4000)),
            ],
            "ThermalData": [
                entry("ProductionConsumption.ThermalSEDesc", json!(800)),
            ],
            "NotSpecifiedData": [
                entry("ProductionConsumption.NotSpecifiedSEDesc", json!(200)),
            ],
        });

        let (grid, mix) = extract_country(&doc, Country::Se);
        assert_eq!(grid.production, 20.0);
        assert_eq!(grid.consumption, 21.5);
        assert_eq!(grid.import_mw, 0.0);
        assert_eq!(grid.export_mw, 1.5);
        assert_eq!(mix.nuclear, 6.0);
        assert_eq!(mix.hydro, 9.0);
        assert_eq!(mix.wind, 4.0);
        assert_eq!(mix.thermal, 0.8);
        assert_eq!(mix.unspecified, 0.2);
    }

    #[test]
    fn test_extract_country_string_and_null_values() {
        // Consumption arrives as the string "1500", production as null.
        let doc = json!({
            "ConsumptionData": [
                entry("ProductionConsumption.ConsumptionSEDesc", json!("1500")),
            ],
            "ProductionData": [
                entry("ProductionConsumption.ProductionSEDesc", json!(null)),
            ],
        });

        let (grid, _mix) = extract_country(&doc, Country::Se);
        assert_eq!(grid.consumption, 1.5);
        assert_eq!(grid.production, 0.0);
    }

    #[test]
    fn test_extract_country_missing_arrays_default_to_zero() {
        let doc = json!({});
        let (grid, mix) = extract_country(&doc, Country::Dk);
        assert_eq!(
            grid,
            GridReading {
                production: 0.0,
                consumption: 0.0,
                import_mw: 0.0,
                export_mw: 0.0,
            }
        );
        assert_eq!(mix.nuclear + mix.hydro + mix.wind + mix.thermal + mix.unspecified, 0.0);
    }

    #[test]
    fn test_extract_country_positive_net_exchange_is_import() {
        let doc = json!({
            "NetExchangeData": [
                entry("ProductionConsumption.NetExchangeFIDesc", json!(2500)),
            ],
        });
        let (grid, _) = extract_country(&doc, Country::Fi);
        assert_eq!(grid.import_mw, 2.5);
        assert_eq!(grid.export_mw, 0.0);
    }

    #[test]
    fn test_extract_country_does_not_cross_countries() {
        let doc = json!({
            "ProductionData": [
                entry("ProductionConsumption.ProductionNODesc", json!(18000)),
            ],
        });
        let (grid, _) = extract_country(&doc, Country::Se);
        assert_eq!(grid.production, 0.0);
    }
}
