//! Prometheus metrics for the siphon engine
//!
//! This module provides metrics tracking for:
//! - Scheduler: submissions, rejections, terminal states, queue depth, busy workers
//! - Strategies: fetch duration and outcome per strategy
//! - Proxy pool: reported outcomes
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails or never happens, metrics operations are no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram_vec, Counter,
    CounterVec, Encoder, Gauge, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all engine metrics
struct EngineMetrics {
    jobs_submitted: Counter,
    jobs_rejected: CounterVec,
    jobs_finished: CounterVec,
    job_retries: Counter,
    queue_depth: Gauge,
    busy_workers: Gauge,
    fetch_duration: HistogramVec,
    fetches: CounterVec,
    proxy_reports: CounterVec,
    change_alerts: Counter,
}

/// Global storage for engine metrics
static ENGINE_METRICS: OnceLock<EngineMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Should be called once at application startup. If registration fails the
/// error is returned and subsequent metric operations become no-ops.
///
/// # Example
///
/// ```no_run
/// if let Err(e) = siphon::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = EngineMetrics {
        jobs_submitted: register_counter!(
            "siphon_jobs_submitted_total",
            "Total jobs accepted by the scheduler"
        )?,
        jobs_rejected: register_counter_vec!(
            "siphon_jobs_rejected_total",
            "Total submissions rejected, by reason",
            &["reason"]
        )?,
        jobs_finished: register_counter_vec!(
            "siphon_jobs_finished_total",
            "Total jobs reaching a terminal state",
            &["state"]
        )?,
        job_retries: register_counter!(
            "siphon_job_retries_total",
            "Total transient-failure retries"
        )?,
        queue_depth: register_gauge!("siphon_queue_depth", "Jobs currently queued")?,
        busy_workers: register_gauge!("siphon_busy_workers", "Workers currently running a job")?,
        fetch_duration: register_histogram_vec!(
            "siphon_fetch_duration_seconds",
            "Duration of individual fetch attempts",
            &["strategy"],
            vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 90.0]
        )?,
        fetches: register_counter_vec!(
            "siphon_fetches_total",
            "Fetch attempts by strategy and outcome",
            &["strategy", "outcome"]
        )?,
        proxy_reports: register_counter_vec!(
            "siphon_proxy_reports_total",
            "Outcomes reported to the proxy pool",
            &["outcome"]
        )?,
        change_alerts: register_counter!(
            "siphon_change_alerts_total",
            "Change alerts raised by streaming monitors"
        )?,
    };

    ENGINE_METRICS
        .set(metrics)
        .map_err(|_| "Engine metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    ENGINE_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

pub fn record_job_submitted() {
    if let Some(m) = ENGINE_METRICS.get() {
        m.jobs_submitted.inc();
    }
}

/// Record a rejected submission (`invalid_spec`, `capacity_exceeded`, ...)
pub fn record_job_rejected(reason: &str) {
    if let Some(m) = ENGINE_METRICS.get() {
        m.jobs_rejected.with_label_values(&[reason]).inc();
    }
}

pub fn record_job_finished(state: &str) {
    if let Some(m) = ENGINE_METRICS.get() {
        m.jobs_finished.with_label_values(&[state]).inc();
    }
}

pub fn record_job_retry() {
    if let Some(m) = ENGINE_METRICS.get() {
        m.job_retries.inc();
    }
}

pub fn set_queue_depth(depth: usize) {
    if let Some(m) = ENGINE_METRICS.get() {
        m.queue_depth.set(depth as f64);
    }
}

pub fn set_busy_workers(busy: usize) {
    if let Some(m) = ENGINE_METRICS.get() {
        m.busy_workers.set(busy as f64);
    }
}

/// Record one fetch attempt
pub fn record_fetch(strategy: &str, success: bool, duration_secs: f64) {
    let Some(m) = ENGINE_METRICS.get() else {
        return;
    };

    let outcome = if success { "success" } else { "failure" };
    m.fetches.with_label_values(&[strategy, outcome]).inc();
    m.fetch_duration
        .with_label_values(&[strategy])
        .observe(duration_secs);
}

pub fn record_proxy_report(success: bool) {
    if let Some(m) = ENGINE_METRICS.get() {
        let outcome = if success { "success" } else { "failure" };
        m.proxy_reports.with_label_values(&[outcome]).inc();
    }
}

pub fn record_change_alert() {
    if let Some(m) = ENGINE_METRICS.get() {
        m.change_alerts.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ensure_metrics_initialized() {
        let _ = init_metrics();
    }

    #[test]
    fn test_init_metrics() {
        assert!(init_metrics().is_ok());
        // Idempotent
        assert!(init_metrics().is_ok());
    }

    #[test]
    fn test_metrics_initialized() {
        ensure_metrics_initialized();
        assert!(metrics_initialized());
    }

    #[test]
    fn test_encode_metrics() {
        ensure_metrics_initialized();
        record_job_submitted();
        let text = encode_metrics().unwrap();
        assert!(text.contains("siphon_jobs_submitted_total"));
    }

    #[test]
    fn test_recording_does_not_panic() {
        ensure_metrics_initialized();
        record_job_rejected("capacity_exceeded");
        record_job_finished("completed");
        record_job_retry();
        set_queue_depth(3);
        set_busy_workers(2);
        record_fetch("static", true, 0.12);
        record_proxy_report(false);
        record_change_alert();
    }
}
