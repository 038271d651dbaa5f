//! Observability infrastructure for the oversell agent
//!
//! Provides:
//! - Prometheus metrics (probe latency, saved samples, errors, pruning, risk scores)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter,
    register_int_counter_vec, GaugeVec, HistogramVec, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Probe durations range from microseconds (proc reads) to seconds (fsync)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

struct AgentMetricsInner {
    probe_latency_seconds: HistogramVec,
    samples_saved: IntCounterVec,
    collection_errors: IntCounterVec,
    storage_errors: IntCounter,
    samples_pruned: IntCounter,
    reports_generated: IntCounterVec,
    risk_score: GaugeVec,
    storage_type_info: GaugeVec,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            probe_latency_seconds: register_histogram_vec!(
                "oversell_agent_probe_latency_seconds",
                "Wall-clock time spent in each probe",
                &["probe"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register probe_latency_seconds"),

            samples_saved: register_int_counter_vec!(
                "oversell_agent_samples_saved_total",
                "Samples written to the store",
                &["metric_type"]
            )
            .expect("Failed to register samples_saved"),

            collection_errors: register_int_counter_vec!(
                "oversell_agent_collection_errors_total",
                "Probe failures; the sample for that tick is skipped",
                &["probe"]
            )
            .expect("Failed to register collection_errors"),

            storage_errors: register_int_counter!(
                "oversell_agent_storage_errors_total",
                "Failed store writes, queries and sweeps"
            )
            .expect("Failed to register storage_errors"),

            samples_pruned: register_int_counter!(
                "oversell_agent_samples_pruned_total",
                "Rows removed by the retention sweep"
            )
            .expect("Failed to register samples_pruned"),

            reports_generated: register_int_counter_vec!(
                "oversell_agent_reports_generated_total",
                "Reports computed",
                &["period"]
            )
            .expect("Failed to register reports_generated"),

            risk_score: register_gauge_vec!(
                "oversell_agent_risk_score",
                "Weighted score of the last report for each period (0-100)",
                &["period"]
            )
            .expect("Failed to register risk_score"),

            storage_type_info: register_gauge_vec!(
                "oversell_agent_storage_type_info",
                "Detected storage medium",
                &["storage_type"]
            )
            .expect("Failed to register storage_type_info"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new)
    }

    pub fn observe_probe_latency(&self, probe: &str, duration_secs: f64) {
        self.inner()
            .probe_latency_seconds
            .with_label_values(&[probe])
            .observe(duration_secs);
    }

    pub fn inc_samples_saved(&self, metric_type: &str) {
        self.inner()
            .samples_saved
            .with_label_values(&[metric_type])
            .inc();
    }

    pub fn inc_collection_errors(&self, probe: &str) {
        self.inner()
            .collection_errors
            .with_label_values(&[probe])
            .inc();
    }

    pub fn inc_storage_errors(&self) {
        self.inner().storage_errors.inc();
    }

    pub fn add_samples_pruned(&self, count: u64) {
        self.inner().samples_pruned.inc_by(count);
    }

    /// Record a finished report and its score
    pub fn record_report(&self, period: &str, score: f64) {
        self.inner()
            .reports_generated
            .with_label_values(&[period])
            .inc();
        self.inner()
            .risk_score
            .with_label_values(&[period])
            .set(score);
    }

    pub fn set_storage_type(&self, storage_type: &str) {
        self.inner().storage_type_info.reset();
        self.inner()
            .storage_type_info
            .with_label_values(&[storage_type])
            .set(1.0);
    }
}

/// Structured logger for agent events
///
/// Emits lifecycle events with a stable `event` field so they can be
/// filtered out of the JSON log stream.
#[derive(Clone)]
pub struct StructuredLogger {
    host: String,
}

impl StructuredLogger {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, storage_type: &str, test_dir: &str) {
        info!(
            event = "agent_started",
            host = %self.host,
            agent_version = %version,
            storage_type = %storage_type,
            test_dir = %test_dir,
            "Oversell agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            host = %self.host,
            reason = %reason,
            "Oversell agent shutting down"
        );
    }

    /// Log a failed probe; the next tick retries
    pub fn log_probe_failure(&self, probe: &str, error: &dyn std::fmt::Display) {
        warn!(
            event = "probe_failed",
            host = %self.host,
            probe = %probe,
            error = %error,
            "Probe failed, skipping this tick"
        );
    }

    pub fn log_storage_failure(&self, operation: &str, error: &dyn std::fmt::Display) {
        warn!(
            event = "storage_failed",
            host = %self.host,
            operation = %operation,
            error = %error,
            "Store operation failed"
        );
    }

    pub fn log_retention_sweep(&self, retention_days: u32, removed: usize) {
        info!(
            event = "retention_sweep",
            host = %self.host,
            retention_days = retention_days,
            removed = removed,
            "Pruned old samples"
        );
    }

    pub fn log_report(&self, period: &str, score: f64, risk_level: &str, delivered: usize) {
        info!(
            event = "report_generated",
            host = %self.host,
            period = %period,
            score = score,
            risk_level = %risk_level,
            delivered = delivered,
            "Report generated"
        );
    }

    pub fn log_report_failure(&self, period: &str, error: &dyn std::fmt::Display) {
        warn!(
            event = "report_failed",
            host = %self.host,
            period = %period,
            error = %error,
            "Report generation failed"
        );
    }
}
