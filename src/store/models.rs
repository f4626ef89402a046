use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Countries and bidding zones
// =============================================================================

/// A Nordic country covered by the grid telemetry feed.
///
/// This is a closed set: storage enforces it with a CHECK constraint and
/// the ingestion pipelines never write anything outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Country {
    Se,
    No,
    Fi,
    Dk,
}

impl Country {
    pub const ALL: [Country; 4] = [Country::Se, Country::No, Country::Fi, Country::Dk];

    /// Two-letter upstream country code ("SE", "NO", ...).
    pub fn code(&self) -> &'static str {
        match self {
            Country::Se => "SE",
            Country::No => "NO",
            Country::Fi => "FI",
            Country::Dk => "DK",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Country::Se => "Sweden",
            Country::No => "Norway",
            Country::Fi => "Finland",
            Country::Dk => "Denmark",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SE" => Some(Country::Se),
            "NO" => Some(Country::No),
            "FI" => Some(Country::Fi),
            "DK" => Some(Country::Dk),
            _ => None,
        }
    }
}

/// A day-ahead bidding zone. The owning country is derived from the zone
/// code prefix ("SE3" belongs to Sweden, "FI" is its own single zone).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Zone {
    Se1,
    Se2,
    Se3,
    Se4,
    No1,
    No2,
    No3,
    No4,
    No5,
    Dk1,
    Dk2,
    Fi,
}

impl Zone {
    pub const ALL: [Zone; 12] = [
        Zone::Se1,
        Zone::Se2,
        Zone::Se3,
        Zone::Se4,
        Zone::No1,
        Zone::No2,
        Zone::No3,
        Zone::No4,
        Zone::No5,
        Zone::Dk1,
        Zone::Dk2,
        Zone::Fi,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Zone::Se1 => "SE1",
            Zone::Se2 => "SE2",
            Zone::Se3 => "SE3",
            Zone::Se4 => "SE4",
            Zone::No1 => "NO1",
            Zone::No2 => "NO2",
            Zone::No3 => "NO3",
            Zone::No4 => "NO4",
            Zone::No5 => "NO5",
            Zone::Dk1 => "DK1",
            Zone::Dk2 => "DK2",
            Zone::Fi => "FI",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SE1" => Some(Zone::Se1),
            "SE2" => Some(Zone::Se2),
            "SE3" => Some(Zone::Se3),
            "SE4" => Some(Zone::Se4),
            "NO1" => Some(Zone::No1),
            "NO2" => Some(Zone::No2),
            "NO3" => Some(Zone::No3),
            "NO4" => Some(Zone::No4),
            "NO5" => Some(Zone::No5),
            "DK1" => Some(Zone::Dk1),
            "DK2" => Some(Zone::Dk2),
            "FI" => Some(Zone::Fi),
            _ => None,
        }
    }

    pub fn country(&self) -> Country {
        match self {
            Zone::Se1 | Zone::Se2 | Zone::Se3 | Zone::Se4 => Country::Se,
            Zone::No1 | Zone::No2 | Zone::No3 | Zone::No4 | Zone::No5 => Country::No,
            Zone::Dk1 | Zone::Dk2 => Country::Dk,
            Zone::Fi => Country::Fi,
        }
    }
}

// =============================================================================
// Time-series rows
// =============================================================================

/// Per-country production/consumption reading for one fetch cycle.
///
/// All power values are MW. `import_mw` and `export_mw` are the split of the
/// upstream net-exchange figure; exactly one of the two is non-zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    /// Minute-resolution UTC timestamp of the fetch cycle.
    pub timestamp: DateTime<Utc>,
    pub country: Country,
    pub production: f64,
    pub consumption: f64,
    pub import_mw: f64,
    pub export_mw: f64,
}

/// Per-country generation breakdown by fuel type, MW. Written in the same
/// transaction as the matching [`GridSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMix {
    pub timestamp: DateTime<Utc>,
    pub country: Country,
    pub nuclear: f64,
    pub hydro: f64,
    pub wind: f64,
    pub thermal: f64,
    pub unspecified: f64,
}

/// One hourly day-ahead price point for a bidding zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotPrice {
    /// Hour-resolution UTC timestamp of the delivery hour.
    pub timestamp: DateTime<Utc>,
    pub zone: Zone,
    /// Price in `currency` per MWh.
    pub price: f64,
    pub currency: String,
}

impl SpotPrice {
    pub fn country(&self) -> Country {
        self.zone.country()
    }
}

/// EUR-based exchange rates shared across all worker processes.
///
/// Replaced wholesale on each successful fetch and persisted in the shared
/// key-value table; workers must never hold a private in-memory copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRateSet {
    /// Base currency, always "EUR".
    pub base: String,
    pub sek: f64,
    pub dkk: f64,
    pub nok: f64,
    pub fetched_at: DateTime<Utc>,
}

impl ExchangeRateSet {
    /// Key under which the set is stored in the shared key-value table.
    pub const STATE_KEY: &'static str = "exchange_rates";
}

/// Counts of rows removed by one retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub grid_rows: usize,
    pub mix_rows: usize,
    pub price_rows: usize,
}

impl RetentionReport {
    pub fn total(&self) -> usize {
        self.grid_rows + self.mix_rows + self.price_rows
    }
}

// =============================================================================
// Spike-filter history lookups
// =============================================================================

/// Field of a [`GridSnapshot`] that is spike-filtered independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GridField {
    Production,
    Consumption,
    Import,
    Export,
}

impl GridField {
    pub const ALL: [GridField; 4] = [
        GridField::Production,
        GridField::Consumption,
        GridField::Import,
        GridField::Export,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            GridField::Production => "production",
            GridField::Consumption => "consumption",
            GridField::Import => "import_mw",
            GridField::Export => "export_mw",
        }
    }
}

/// Field of a [`GenerationMix`] that is spike-filtered independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MixField {
    Nuclear,
    Hydro,
    Wind,
    Thermal,
    Unspecified,
}

impl MixField {
    pub const ALL: [MixField; 5] = [
        MixField::Nuclear,
        MixField::Hydro,
        MixField::Wind,
        MixField::Thermal,
        MixField::Unspecified,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            MixField::Nuclear => "nuclear",
            MixField::Hydro => "hydro",
            MixField::Wind => "wind",
            MixField::Thermal => "thermal",
            MixField::Unspecified => "unspecified",
        }
    }
}

// =============================================================================
// Job observability
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRunStatus {
    Running,
    Completed,
    Failed,
}

impl JobRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobRunStatus::Running => "running",
            JobRunStatus::Completed => "completed",
            JobRunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(JobRunStatus::Running),
            "completed" => Some(JobRunStatus::Completed),
            "failed" => Some(JobRunStatus::Failed),
            _ => None,
        }
    }
}

/// One recorded execution of a background job.
#[derive(Debug, Clone)]
pub struct JobRun {
    pub id: i64,
    pub job_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: JobRunStatus,
    pub error_message: Option<String>,
    /// How the job was triggered: "schedule", "startup", "manual".
    pub triggered_by: String,
}

#[derive(Debug, Clone)]
pub struct JobScheduleState {
    pub job_id: String,
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_country_derivation() {
        assert_eq!(Zone::Se3.country(), Country::Se);
        assert_eq!(Zone::No5.country(), Country::No);
        assert_eq!(Zone::Dk2.country(), Country::Dk);
        assert_eq!(Zone::Fi.country(), Country::Fi);
    }

    #[test]
    fn test_zone_roundtrip() {
        for zone in Zone::ALL {
            assert_eq!(Zone::parse(zone.code()), Some(zone));
        }
        assert_eq!(Zone::parse("SE5"), None);
        assert_eq!(Zone::parse("se3"), None);
    }

    #[test]
    fn test_country_roundtrip() {
        for country in Country::ALL {
            assert_eq!(Country::parse(country.code()), Some(country));
        }
        assert_eq!(Country::parse("DE"), None);
    }

    #[test]
    fn test_job_run_status_roundtrip() {
        for status in [
            JobRunStatus::Running,
            JobRunStatus::Completed,
            JobRunStatus::Failed,
        ] {
            assert_eq!(JobRunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobRunStatus::parse("unknown"), None);
    }

    #[test]
    fn test_retention_report_total() {
        let report = RetentionReport {
            grid_rows: 3,
            mix_rows: 2,
            price_rows: 5,
        };
        assert_eq!(report.total(), 10);
    }
}
