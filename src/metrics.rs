use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

use crate::endpoint::Side;

/// Metric name prefix for all snaprelay metrics
const PREFIX: &str = "snaprelay";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref JOB_INVOCATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_job_invocations_total"), "Job invocations by outcome"),
        &["job", "outcome"]
    ).expect("Failed to create job_invocations_total metric");

    // Replication can run for hours, hence the long tail.
    pub static ref JOB_INVOCATION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_job_invocation_duration_seconds"),
            "Duration of one replicate-and-prune invocation in seconds"
        )
        .buckets(vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 4.0 * 3600.0, 12.0 * 3600.0]),
        &["job"]
    ).expect("Failed to create job_invocation_duration_seconds metric");

    pub static ref JOB_WAKEUPS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_job_wakeups_total"), "Wakeup requests delivered to jobs"),
        &["job", "result"]
    ).expect("Failed to create job_wakeups_total metric");

    pub static ref JOB_RUNNING: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_job_running"), "1 while the job is executing an invocation"),
        &["job"]
    ).expect("Failed to create job_running metric");

    pub static ref PRUNE_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_prune_failures_total"), "Failed pruning runs by side"),
        &["job", "side"]
    ).expect("Failed to create prune_failures_total metric");
}

/// Register all metrics with the registry. Safe to call more than once.
pub fn init_metrics() {
    let _ = REGISTRY.register(Box::new(JOB_INVOCATIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOB_INVOCATION_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(JOB_WAKEUPS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOB_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(PRUNE_FAILURES_TOTAL.clone()));
}

pub fn record_invocation(job: &str, outcome: &str, duration: Duration) {
    JOB_INVOCATIONS_TOTAL
        .with_label_values(&[job, outcome])
        .inc();
    JOB_INVOCATION_DURATION_SECONDS
        .with_label_values(&[job])
        .observe(duration.as_secs_f64());
}

pub fn set_job_running(job: &str, running: bool) {
    JOB_RUNNING
        .with_label_values(&[job])
        .set(if running { 1.0 } else { 0.0 });
}

pub fn record_wakeup(job: &str, result: &str) {
    JOB_WAKEUPS_TOTAL.with_label_values(&[job, result]).inc();
}

pub fn record_prune_failure(job: &str, side: Side) {
    PRUNE_FAILURES_TOTAL
        .with_label_values(&[job, side.as_str()])
        .inc();
}

/// Render the registry in the Prometheus text format.
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    match render() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
