//! Client for the EUR-base exchange-rate feed.

use super::backoff::{fetch_with_retry, FetchError, RetryPolicy};
use crate::store::ExchangeRateSet;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Upstream document: target currency code -> rate against a EUR base.
#[derive(Debug, Clone, Deserialize)]
pub struct RatesDocument {
    #[serde(default = "default_base")]
    pub base: String,
    #[serde(default)]
    pub rates: HashMap<String, f64>,
}

fn default_base() -> String {
    "EUR".to_string()
}

impl RatesDocument {
    /// Build the canonical rate set. A document missing one of the Nordic
    /// currencies fails the whole cycle rather than storing a zero rate;
    /// the previously stored set stays in effect.
    pub fn into_rate_set(self, fetched_at: DateTime<Utc>) -> Result<ExchangeRateSet, FetchError> {
        let rate = |code: &str| {
            self.rates
                .get(code)
                .copied()
                .ok_or_else(|| FetchError::Decode(format!("missing {} rate", code)))
        };
        Ok(ExchangeRateSet {
            base: self.base.clone(),
            sek: rate("SEK")?,
            dkk: rate("DKK")?,
            nok: rate("NOK")?,
            fetched_at,
        })
    }
}

/// Upstream exchange-rate feed.
#[async_trait]
pub trait RatesApi: Send + Sync {
    async fn eur_rates(&self) -> Result<RatesDocument, FetchError>;
}

pub struct HttpRatesApi {
    client: reqwest::Client,
    url: String,
    policy: RetryPolicy,
}

impl HttpRatesApi {
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
impl RatesApi for HttpRatesApi {
    async fn eur_rates(&self) -> Result<RatesDocument, FetchError> {
        let response = fetch_with_retry(&self.policy, || self.client.get(&self.url)).await?;
        response.json().await.map_err(FetchError::decode)
    }
}
