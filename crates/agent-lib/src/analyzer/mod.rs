//! Risk analysis over stored samples
//!
//! A pure query-and-compute pipeline: read each metric type over the
//! window, summarize, compare with the trailing week, score each dimension
//! and fold the scores into one weighted total and risk level.

mod baseline;
pub mod describe;
pub mod ladder;
pub mod score;
pub mod stats;

pub use baseline::{BaselineSamples, CurrentMeans, BASELINE_DAYS, MIN_BASELINE_SAMPLES};
pub use score::confidence_boost;

use crate::collector::DiskProbe;
use crate::error::StorageError;
use crate::models::{
    HourlyStats, MetricSample, MetricType, PeriodStats, RiskLevel, SamplePayload, StorageType,
};
use crate::store::MetricStore;
use chrono::{DateTime, Duration, Timelike, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Computes [`PeriodStats`] from the store.
///
/// The storage type is fixed at construction and selects the latency ladders.
#[derive(Clone)]
pub struct RiskAnalyzer {
    store: Arc<MetricStore>,
    storage_type: StorageType,
}

impl RiskAnalyzer {
    pub fn new(store: Arc<MetricStore>, storage_type: StorageType) -> Self {
        Self {
            store,
            storage_type,
        }
    }

    /// Analyzer whose storage type comes from the probe (sysfs, then latency)
    pub fn detect(store: Arc<MetricStore>, probe: &DiskProbe) -> Self {
        let storage_type = probe.classify_storage();
        debug!(%storage_type, "detected storage type");
        Self::new(store, storage_type)
    }

    pub fn storage_type(&self) -> StorageType {
        self.storage_type
    }

    /// Analyze `[start, end]`. Metric types without samples contribute
    /// zero-valued statistics; store errors are returned as-is.
    pub fn analyze(
        &self,
        period: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<PeriodStats, StorageError> {
        let mut stats = PeriodStats::empty(period, start, end, self.storage_type);
        let query = |t: MetricType| self.store.query(t, start, end);

        let steal = query(MetricType::CpuSteal)?;
        let iowait = query(MetricType::CpuIowait)?;
        fold_cpu(&mut stats, &steal, &iowait);
        stats.hourly = hourly_breakdown(&steal, &iowait);

        let bench = stats::values(&query(MetricType::CpuBench)?);
        stats.cpu_bench_avg = stats::mean(&bench);
        stats.cpu_bench_cv = stats::coefficient_of_variation(&bench);

        let io = stats::values(&query(MetricType::IoLatency)?);
        stats.io_latency_avg = stats::mean(&io);
        stats.io_latency_p95 = stats::percentile(&io, 95.0);
        stats.io_latency_p99 = stats::percentile(&io, 99.0);

        fold_random_io(&mut stats, &query(MetricType::RandomIo)?);
        fold_disk_busy(&mut stats, &query(MetricType::DiskStats)?);
        fold_memory(&mut stats, &query(MetricType::Memory)?);

        let load = stats::values(&query(MetricType::CpuLoad)?);
        stats.cpu_load_avg = stats::mean(&load);
        stats.cpu_load_max = stats::max(&load);

        let baseline = self.baseline_samples(start)?;
        let (deviation, status) = baseline.deviation(&CurrentMeans {
            cpu_steal: stats.cpu_steal_avg,
            io_latency: stats.io_latency_avg,
            cpu_load: stats.cpu_load_avg,
        });
        stats.baseline_deviation = deviation;
        stats.baseline_status = status;

        stats.confidence_boost =
            confidence_boost(stats.cpu_load_avg, stats.cpu_steal_avg, stats.cpu_iowait_avg);
        stats.scores = score::dimension_scores(&stats, stats.confidence_boost);
        stats.total_score = score::weighted_total(&stats.scores);
        stats.risk_level = RiskLevel::from_score(stats.total_score);
        stats.risk_details = findings(&stats);

        debug!(
            period,
            total_score = stats.total_score,
            risk_level = %stats.risk_level,
            boost = stats.confidence_boost,
            "period analyzed"
        );

        Ok(stats)
    }

    /// Samples from the week ending at `start`
    fn baseline_samples(&self, start: DateTime<Utc>) -> Result<BaselineSamples, StorageError> {
        let from = start - Duration::days(BASELINE_DAYS);
        let values = |t: MetricType| -> Result<Vec<f64>, StorageError> {
            Ok(stats::values(&self.store.query(t, from, start)?))
        };

        Ok(BaselineSamples {
            cpu_steal: values(MetricType::CpuSteal)?,
            io_latency: values(MetricType::IoLatency)?,
            cpu_load: values(MetricType::CpuLoad)?,
        })
    }
}

fn fold_cpu(stats: &mut PeriodStats, steal: &[MetricSample], iowait: &[MetricSample]) {
    let steal_values = stats::values(steal);
    stats.cpu_steal_avg = stats::mean(&steal_values);
    stats.cpu_steal_p95 = stats::percentile(&steal_values, 95.0);
    if let Some((max, at)) = stats::peak(steal) {
        stats.cpu_steal_max = max;
        stats.cpu_steal_max_at = Some(at);
    }

    let iowait_values = stats::values(iowait);
    stats.cpu_iowait_avg = stats::mean(&iowait_values);
    stats.cpu_iowait_p95 = stats::percentile(&iowait_values, 95.0);
    if let Some((max, at)) = stats::peak(iowait) {
        stats.cpu_iowait_max = max;
        stats.cpu_iowait_max_at = Some(at);
    }
}

/// Write P95 is scored; read latency is informational
fn fold_random_io(stats: &mut PeriodStats, samples: &[MetricSample]) {
    let (writes, reads): (Vec<f64>, Vec<f64>) = samples
        .iter()
        .filter_map(|s| match s.extra {
            Some(SamplePayload::RandomIo {
                write_latency_ms,
                read_latency_ms,
                ..
            }) => Some((write_latency_ms, read_latency_ms)),
            _ => None,
        })
        .unzip();

    stats.random_io_write_avg = stats::mean(&writes);
    stats.random_io_read_avg = stats::mean(&reads);
    stats.random_io_p95 = stats::percentile(&writes, 95.0);
}

/// Only rows with a measured interval count; the first reading after a
/// restart has none
fn fold_disk_busy(stats: &mut PeriodStats, samples: &[MetricSample]) {
    let busy: Vec<f64> = samples
        .iter()
        .filter_map(|s| match s.extra {
            Some(SamplePayload::DiskStats { busy_percent, .. }) => busy_percent,
            _ => None,
        })
        .collect();

    stats.disk_busy_percent = stats::mean(&busy);
    stats.disk_busy_p95 = stats::percentile(&busy, 95.0);
}

/// Latest reading wins. Rows without a payload, or with a zero
/// `available_percent`, fall back to 100 minus the stored usage %.
fn fold_memory(stats: &mut PeriodStats, samples: &[MetricSample]) {
    let Some(latest) = samples.last() else {
        return;
    };
    stats.memory_available_percent = match latest.extra {
        Some(SamplePayload::Memory {
            available_percent, ..
        }) if available_percent > 0.0 => available_percent,
        _ => 100.0 - latest.value,
    };
}

/// Mean steal and iowait per UTC hour of day, for hours with data
pub fn hourly_breakdown(steal: &[MetricSample], iowait: &[MetricSample]) -> Vec<HourlyStats> {
    #[derive(Default)]
    struct Bucket {
        steal: Vec<f64>,
        iowait: Vec<f64>,
    }

    let mut buckets: BTreeMap<u32, Bucket> = BTreeMap::new();
    for s in steal {
        buckets.entry(s.timestamp.hour()).or_default().steal.push(s.value);
    }
    for s in iowait {
        buckets.entry(s.timestamp.hour()).or_default().iowait.push(s.value);
    }

    buckets
        .into_iter()
        .map(|(hour, b)| HourlyStats {
            hour,
            cpu_steal_avg: stats::mean(&b.steal),
            cpu_iowait_avg: stats::mean(&b.iowait),
            samples: b.steal.len().max(b.iowait.len()),
        })
        .collect()
}

fn findings(stats: &PeriodStats) -> BTreeMap<String, String> {
    [
        (
            "cpu_steal",
            describe::cpu_steal(stats.cpu_steal_avg, stats.cpu_steal_max),
        ),
        ("cpu_iowait", describe::cpu_iowait(stats.cpu_iowait_avg)),
        ("cpu_stability", describe::cpu_stability(stats.cpu_bench_cv)),
        (
            "io_latency",
            describe::io_latency(stats.io_latency_p95, stats.storage_type),
        ),
        (
            "random_io",
            describe::random_io(
                stats.random_io_write_avg,
                stats.random_io_read_avg,
                stats.storage_type,
            ),
        ),
        ("disk_busy", describe::disk_busy(stats.disk_busy_percent)),
        ("memory", describe::memory(stats.memory_available_percent)),
        (
            "cpu_load",
            describe::cpu_load(stats.cpu_load_avg, stats.cpu_load_max),
        ),
        (
            "baseline",
            describe::baseline(stats.baseline_deviation, stats.baseline_status),
        ),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}
