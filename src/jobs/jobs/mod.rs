//! Concrete background jobs registered at startup.

mod exchange_rates;
mod grid_ingest;
mod price_ingest;
mod retention_cleanup;

pub use exchange_rates::ExchangeRatesJob;
pub use grid_ingest::GridIngestJob;
pub use price_ingest::PriceIngestJob;
pub use retention_cleanup::RetentionCleanupJob;
