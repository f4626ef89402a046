//! Prometheus metrics for the ingestion pipelines and the job scheduler.
//!
//! This is the process's observability sink: per-run outcomes are recorded
//! here and in the `job_runs` table instead of in global mutable status
//! variables.

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all Gridwatt metrics
const PREFIX: &str = "gridwatt";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Background job metrics
    pub static ref JOB_EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_job_executions_total"), "Background job executions by outcome"),
        &["job", "status"]
    ).expect("Failed to create job_executions_total metric");

    pub static ref JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_job_duration_seconds"),
            "Background job execution duration in seconds"
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0]),
        &["job"]
    ).expect("Failed to create job_duration_seconds metric");

    pub static ref JOB_RUNNING: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_job_running"), "1 while the job is executing"),
        &["job"]
    ).expect("Failed to create job_running metric");

    // Upstream fetch metrics
    pub static ref FETCH_OUTCOMES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_fetch_outcomes_total"), "Upstream fetch outcomes after retries"),
        &["source", "outcome"]
    ).expect("Failed to create fetch_outcomes_total metric");

    // Data quality metrics
    pub static ref SPIKE_DECISIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_spike_decisions_total"), "Spike filter decisions per series"),
        &["series", "decision"]
    ).expect("Failed to create spike_decisions_total metric");

    // Storage metrics
    pub static ref ROWS_WRITTEN_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_rows_written_total"), "Rows upserted per table"),
        &["table"]
    ).expect("Failed to create rows_written_total metric");

    pub static ref ROWS_PURGED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_rows_purged_total"), "Rows removed by retention sweeps"),
        &["table"]
    ).expect("Failed to create rows_purged_total metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(JOB_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(JOB_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(FETCH_OUTCOMES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SPIKE_DECISIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ROWS_WRITTEN_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ROWS_PURGED_TOTAL.clone()));

    tracing::info!("Metrics system initialized");
}

pub fn record_job_execution(job_id: &str, status: &str, elapsed: Duration) {
    JOB_EXECUTIONS_TOTAL
        .with_label_values(&[job_id, status])
        .inc();
    JOB_DURATION_SECONDS
        .with_label_values(&[job_id])
        .observe(elapsed.as_secs_f64());
}

pub fn set_job_running(job_id: &str, running: bool) {
    JOB_RUNNING
        .with_label_values(&[job_id])
        .set(if running { 1.0 } else { 0.0 });
}

pub fn record_fetch_outcome(source: &str, outcome: &str) {
    FETCH_OUTCOMES_TOTAL
        .with_label_values(&[source, outcome])
        .inc();
}

pub fn record_spike_decision(series: &str, decision: &str) {
    SPIKE_DECISIONS_TOTAL
        .with_label_values(&[series, decision])
        .inc();
}

pub fn add_rows_written(table: &str, count: usize) {
    ROWS_WRITTEN_TOTAL
        .with_label_values(&[table])
        .inc_by(count as f64);
}

pub fn add_rows_purged(table: &str, count: usize) {
    ROWS_PURGED_TOTAL
        .with_label_values(&[table])
        .inc_by(count as f64);
}

/// Encode the registry in the Prometheus text exposition format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&REGISTRY.gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
