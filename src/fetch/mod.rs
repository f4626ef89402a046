//! Upstream integrations: the shared retry primitive, defensive payload
//! normalization and one client per feed.

pub mod backoff;
pub mod grid;
pub mod normalize;
pub mod prices;
pub mod rates;

pub use backoff::{fetch_with_retry, FetchError, RetryPolicy};
pub use grid::{GridApi, HttpGridApi};
pub use prices::{HttpPriceApi, PriceApi};
pub use rates::{HttpRatesApi, RatesApi};
