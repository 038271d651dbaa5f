//! Core data models for the oversell agent

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Kind of observation held in a sample row.
///
/// Every type has its own cadence and its own scoring rule; rows never mix types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    CpuSteal,
    CpuIowait,
    CpuBench,
    /// Sequential write+fsync latency
    IoLatency,
    RandomIo,
    /// Cumulative block-device counters
    DiskStats,
    Memory,
    CpuLoad,
}

impl MetricType {
    pub const ALL: [MetricType; 8] = [
        MetricType::CpuSteal,
        MetricType::CpuIowait,
        MetricType::CpuBench,
        MetricType::IoLatency,
        MetricType::RandomIo,
        MetricType::DiskStats,
        MetricType::Memory,
        MetricType::CpuLoad,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::CpuSteal => "cpu_steal",
            MetricType::CpuIowait => "cpu_iowait",
            MetricType::CpuBench => "cpu_bench",
            MetricType::IoLatency => "io_latency",
            MetricType::RandomIo => "random_io",
            MetricType::DiskStats => "disk_stats",
            MetricType::Memory => "memory",
            MetricType::CpuLoad => "cpu_load",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known metric type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown metric type '{0}'")]
pub struct UnknownMetricType(pub String);

impl FromStr for MetricType {
    type Err = UnknownMetricType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownMetricType(s.to_string()))
    }
}

/// Auxiliary readings attached to a sample, one shape per metric type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SamplePayload {
    SequentialIo {
        write_ms: f64,
        sync_ms: f64,
    },
    RandomIo {
        write_latency_ms: f64,
        read_latency_ms: f64,
        used_direct_io: bool,
    },
    DiskStats {
        read_ops: u64,
        write_ops: u64,
        read_bytes: u64,
        write_bytes: u64,
        io_time_ms: u64,
        weighted_io_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        busy_percent: Option<f64>,
    },
    Memory {
        total_kb: u64,
        available_kb: u64,
        available_percent: f64,
        swap_usage_percent: f64,
    },
    CpuLoad {
        load1: f64,
        load5: f64,
        load15: f64,
        num_cpu: usize,
    },
}

impl SamplePayload {
    /// The only metric type this payload may be attached to
    pub fn metric_type(&self) -> MetricType {
        match self {
            SamplePayload::SequentialIo { .. } => MetricType::IoLatency,
            SamplePayload::RandomIo { .. } => MetricType::RandomIo,
            SamplePayload::DiskStats { .. } => MetricType::DiskStats,
            SamplePayload::Memory { .. } => MetricType::Memory,
            SamplePayload::CpuLoad { .. } => MetricType::CpuLoad,
        }
    }
}

/// One timestamped observation.
///
/// `id` is assigned by the store on insertion; unsaved samples carry `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub metric_type: MetricType,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<SamplePayload>,
}

impl MetricSample {
    /// New sample stamped with the current time (second resolution)
    pub fn new(metric_type: MetricType, value: f64) -> Self {
        Self::at(Utc::now(), metric_type, value)
    }

    pub fn at(timestamp: DateTime<Utc>, metric_type: MetricType, value: f64) -> Self {
        Self {
            id: None,
            timestamp: timestamp.trunc_subsecs(0),
            metric_type,
            value,
            extra: None,
        }
    }

    pub fn with_payload(mut self, payload: SamplePayload) -> Self {
        self.extra = Some(payload);
        self
    }
}

/// Underlying storage medium, used to pick latency thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StorageType {
    #[serde(rename = "SSD")]
    Ssd,
    #[serde(rename = "HDD")]
    Hdd,
    #[default]
    Unknown,
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageType::Ssd => f.write_str("SSD"),
            StorageType::Hdd => f.write_str("HDD"),
            StorageType::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Discrete classification of the weighted score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Excellent,
    Good,
    Medium,
    Severe,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            RiskLevel::Excellent
        } else if score >= 70.0 {
            RiskLevel::Good
        } else if score >= 50.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Severe
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Excellent => "excellent",
            RiskLevel::Good => "good",
            RiskLevel::Medium => "medium",
            RiskLevel::Severe => "severe",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trend of the current window against the trailing baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaselineStatus {
    #[default]
    Stable,
    Degrading,
    Improving,
}

impl BaselineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BaselineStatus::Stable => "stable",
            BaselineStatus::Degrading => "degrading",
            BaselineStatus::Improving => "improving",
        }
    }
}

impl fmt::Display for BaselineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mean steal and iowait for one hour of the day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyStats {
    pub hour: u32,
    pub cpu_steal_avg: f64,
    pub cpu_iowait_avg: f64,
    pub samples: usize,
}

impl HourlyStats {
    pub fn contention(&self) -> f64 {
        self.cpu_steal_avg + self.cpu_iowait_avg
    }
}

/// Per-dimension scores after confidence adjustment, each in 0..=100.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionScores {
    pub cpu_steal: f64,
    pub cpu_iowait: f64,
    pub cpu_stability: f64,
    pub io_latency: f64,
    pub random_io: f64,
    pub disk_busy: f64,
    pub memory: f64,
    pub baseline: f64,
}

/// Aggregate for a `(start, end)` window. Computed on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodStats {
    pub period: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub storage_type: StorageType,

    pub cpu_steal_avg: f64,
    pub cpu_steal_max: f64,
    pub cpu_steal_p95: f64,
    pub cpu_steal_max_at: Option<DateTime<Utc>>,

    pub cpu_iowait_avg: f64,
    pub cpu_iowait_max: f64,
    pub cpu_iowait_p95: f64,
    pub cpu_iowait_max_at: Option<DateTime<Utc>>,

    pub cpu_bench_avg: f64,
    /// Coefficient of variation of benchmark durations
    pub cpu_bench_cv: f64,

    pub io_latency_avg: f64,
    pub io_latency_p95: f64,
    pub io_latency_p99: f64,

    pub random_io_write_avg: f64,
    pub random_io_read_avg: f64,
    pub random_io_p95: f64,

    pub disk_busy_percent: f64,
    pub disk_busy_p95: f64,

    pub memory_available_percent: f64,

    /// Load1 normalized by core count
    pub cpu_load_avg: f64,
    pub cpu_load_max: f64,

    /// Absolute average deviation from the trailing baseline, in percent
    pub baseline_deviation: f64,
    pub baseline_status: BaselineStatus,

    pub hourly: Vec<HourlyStats>,

    pub confidence_boost: f64,
    pub scores: DimensionScores,
    pub total_score: f64,
    pub risk_level: RiskLevel,
    pub risk_details: BTreeMap<String, String>,
}

impl PeriodStats {
    /// Zero-valued stats for a window, before any metric is folded in
    pub fn empty(
        period: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        storage_type: StorageType,
    ) -> Self {
        Self {
            period: period.into(),
            start,
            end,
            storage_type,
            cpu_steal_avg: 0.0,
            cpu_steal_max: 0.0,
            cpu_steal_p95: 0.0,
            cpu_steal_max_at: None,
            cpu_iowait_avg: 0.0,
            cpu_iowait_max: 0.0,
            cpu_iowait_p95: 0.0,
            cpu_iowait_max_at: None,
            cpu_bench_avg: 0.0,
            cpu_bench_cv: 0.0,
            io_latency_avg: 0.0,
            io_latency_p95: 0.0,
            io_latency_p99: 0.0,
            random_io_write_avg: 0.0,
            random_io_read_avg: 0.0,
            random_io_p95: 0.0,
            disk_busy_percent: 0.0,
            disk_busy_p95: 0.0,
            memory_available_percent: 0.0,
            cpu_load_avg: 0.0,
            cpu_load_max: 0.0,
            baseline_deviation: 0.0,
            baseline_status: BaselineStatus::Stable,
            hourly: Vec::new(),
            confidence_boost: 1.0,
            scores: DimensionScores::default(),
            total_score: 0.0,
            risk_level: RiskLevel::Severe,
            risk_details: BTreeMap::new(),
        }
    }

    /// Up to three hours with the highest steal+iowait, above 1%
    pub fn busiest_hours(&self) -> Vec<&HourlyStats> {
        let mut sorted: Vec<&HourlyStats> = self.hourly.iter().collect();
        sorted.sort_by(|a, b| b.contention().total_cmp(&a.contention()));
        sorted
            .into_iter()
            .take(3)
            .filter(|h| h.contention() > 1.0)
            .collect()
    }

    /// The three quietest hours, once at least six hours have data
    pub fn quietest_hours(&self) -> Vec<&HourlyStats> {
        if self.hourly.len() < 6 {
            return Vec::new();
        }
        let mut sorted: Vec<&HourlyStats> = self.hourly.iter().collect();
        sorted.sort_by(|a, b| a.contention().total_cmp(&b.contention()));
        sorted.into_iter().take(3).collect()
    }
}
