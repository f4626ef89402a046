use crate::config::RetrySettings;
use crate::spike::SpikeFilterSettings;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub grid_url: Option<String>,
    pub price_url: Option<String>,
    pub rates_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub grid_interval_minutes: Option<u64>,
    pub price_interval_minutes: Option<u64>,
    pub rates_interval_hours: Option<u64>,
    pub cleanup_interval_hours: Option<u64>,
    pub retention_days: Option<u64>,

    // Feature configs
    pub retry: Option<RetrySettings>,
    pub spike: Option<SpikeFilterSettings>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert!(config.db_dir.is_none());
        assert!(config.retry.is_none());
        assert!(config.spike.is_none());
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: FileConfig = toml::from_str(
            r#"
            db_dir = "/data"
            retention_days = 90

            [spike]
            k = 6.0

            [retry]
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.db_dir.as_deref(), Some("/data"));
        assert_eq!(config.retention_days, Some(90));

        let spike = config.spike.unwrap();
        assert_eq!(spike.k, 6.0);
        assert_eq!(spike.window, SpikeFilterSettings::default().window);

        let retry = config.retry.unwrap();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.multiplier, RetrySettings::default().multiplier);
    }
}
