//! Rolling robust-statistics spike filter.
//!
//! Incoming readings are judged against the most recent already-persisted
//! values for the same field and entity using the median and the median
//! absolute deviation (MAD). The filter is stateless: callers query the
//! history window from storage before each evaluation, so every worker
//! process reaches the same verdict for the same data.

use serde::Deserialize;

/// Tuning knobs for the spike filter. One instance is shared by all series.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpikeFilterSettings {
    /// Spike when `|value - median| > k * MAD`.
    pub k: f64,
    /// Relative band used when the MAD degenerates to zero but the median
    /// is non-zero.
    pub fallback_pct: f64,
    /// Absolute band used when the window legitimately sits at zero.
    pub zero_tolerance: f64,
    /// Below this many historical values every reading is accepted, so a
    /// cold-start entity can begin ingesting data.
    pub min_history: usize,
    /// Number of most recent persisted values the callers fetch as history.
    pub window: usize,
}

impl Default for SpikeFilterSettings {
    fn default() -> Self {
        Self {
            k: 4.0,
            fallback_pct: 0.5,
            zero_tolerance: 1.0,
            min_history: 6,
            window: 24,
        }
    }
}

/// Which test produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpikeTest {
    /// Not enough history; the reading was accepted unconditionally.
    InsufficientHistory,
    /// The regular `k * MAD` band.
    MadRatio,
    /// Percentage band fallback for a zero MAD over a non-zero median.
    PercentFallback,
    /// Absolute band for a window sitting at zero.
    ZeroTolerance,
}

impl SpikeTest {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpikeTest::InsufficientHistory => "insufficient_history",
            SpikeTest::MadRatio => "mad_ratio",
            SpikeTest::PercentFallback => "percent_fallback",
            SpikeTest::ZeroTolerance => "zero_tolerance",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub is_spike: bool,
    pub test: SpikeTest,
    /// Median of the history window, when one was computed. Grid callers
    /// clamp a spiked reading to this value before writing.
    pub median: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct SpikeFilter {
    settings: SpikeFilterSettings,
}

impl SpikeFilter {
    pub fn new(settings: SpikeFilterSettings) -> Self {
        Self { settings }
    }

    /// History size callers should request from storage.
    pub fn window(&self) -> usize {
        self.settings.window
    }

    /// Judge a new reading against its history window.
    pub fn evaluate(&self, value: f64, history: &[f64]) -> Verdict {
        if history.len() < self.settings.min_history {
            return Verdict {
                is_spike: false,
                test: SpikeTest::InsufficientHistory,
                median: None,
            };
        }

        let med = median(history);
        let deviations: Vec<f64> = history.iter().map(|v| (v - med).abs()).collect();
        let mad = median(&deviations);

        if mad > 0.0 {
            return Verdict {
                is_spike: (value - med).abs() > self.settings.k * mad,
                test: SpikeTest::MadRatio,
                median: Some(med),
            };
        }

        // Degenerate window: every recent value is identical, so the ratio
        // test is undefined.
        if med.abs() < f64::EPSILON {
            Verdict {
                is_spike: value.abs() > self.settings.zero_tolerance,
                test: SpikeTest::ZeroTolerance,
                median: Some(med),
            }
        } else {
            Verdict {
                is_spike: (value - med).abs() > self.settings.fallback_pct * med.abs(),
                test: SpikeTest::PercentFallback,
                median: Some(med),
            }
        }
    }
}

/// Median of a non-empty sample; the mean of the two middle elements for an
/// even length. Returns 0.0 for an empty slice.
fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
