//! Gridwatt Ingestion Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod fetch;
pub mod ingest;
pub mod jobs;
pub mod metrics;
pub mod spike;
pub mod store;

// Re-export commonly used types for convenience
pub use config::{AppConfig, CliConfig, FileConfig, RetrySettings};
pub use ingest::{Freshness, GridIngestor, PriceIngestor, RateIngestor, RefreshRegistry};
pub use spike::{SpikeFilter, SpikeFilterSettings};
pub use store::{EnergyStore, SqliteEnergyStore};
