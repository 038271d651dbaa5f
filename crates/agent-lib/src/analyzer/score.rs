//! Weighted risk score

use super::ladder;
use crate::models::{DimensionScores, PeriodStats};

/// Weight of each dimension in the total; sums to 1
pub mod weights {
    pub const CPU_STEAL: f64 = 0.35;
    pub const CPU_IOWAIT: f64 = 0.10;
    pub const CPU_STABILITY: f64 = 0.10;
    pub const IO_LATENCY: f64 = 0.15;
    pub const RANDOM_IO: f64 = 0.10;
    pub const DISK_BUSY: f64 = 0.05;
    pub const MEMORY: f64 = 0.10;
    pub const BASELINE: f64 = 0.05;
}

/// Normalized load below which contention cannot be blamed on local work
const IDLE_LOAD: f64 = 0.7;
const STEAL_TRIGGER: f64 = 3.0;
const IOWAIT_TRIGGER: f64 = 5.0;
const MAX_BOOST: f64 = 1.2;

/// Multiplier applied to steal/iowait penalties when the host is mostly
/// idle yet still sees contention. Always within `[1.0, 1.2]`.
pub fn confidence_boost(normalized_load: f64, steal_avg: f64, iowait_avg: f64) -> f64 {
    if normalized_load >= IDLE_LOAD {
        return 1.0;
    }
    if steal_avg > STEAL_TRIGGER || iowait_avg > IOWAIT_TRIGGER {
        return (1.0 + (IDLE_LOAD - normalized_load) * 0.3).min(MAX_BOOST);
    }
    1.0
}

/// Divide an imperfect score by the boost; a perfect score is never touched
fn sharpen(score: f64, boost: f64) -> f64 {
    if boost > 1.0 && score < 100.0 {
        score / boost
    } else {
        score
    }
}

/// Score all eight dimensions of `stats`
pub fn dimension_scores(stats: &PeriodStats, boost: f64) -> DimensionScores {
    DimensionScores {
        cpu_steal: sharpen(ladder::CPU_STEAL.score(stats.cpu_steal_avg), boost),
        cpu_iowait: sharpen(ladder::CPU_IOWAIT.score(stats.cpu_iowait_avg), boost),
        cpu_stability: ladder::CPU_STABILITY.score(stats.cpu_bench_cv),
        io_latency: ladder::io_latency(stats.storage_type).score(stats.io_latency_p95),
        random_io: ladder::random_io(stats.storage_type).score(stats.random_io_p95),
        disk_busy: ladder::DISK_BUSY.score(stats.disk_busy_percent),
        memory: ladder::MEMORY.score(stats.memory_available_percent),
        baseline: ladder::BASELINE.score(stats.baseline_deviation),
    }
}

pub fn weighted_total(scores: &DimensionScores) -> f64 {
    scores.cpu_steal * weights::CPU_STEAL
        + scores.cpu_iowait * weights::CPU_IOWAIT
        + scores.cpu_stability * weights::CPU_STABILITY
        + scores.io_latency * weights::IO_LATENCY
        + scores.random_io * weights::RANDOM_IO
        + scores.disk_busy * weights::DISK_BUSY
        + scores.memory * weights::MEMORY
        + scores.baseline * weights::BASELINE
}
