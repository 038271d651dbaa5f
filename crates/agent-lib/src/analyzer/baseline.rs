//! Comparison of a window against the trailing week

use super::stats::mean;
use crate::models::BaselineStatus;

/// Length of the trailing baseline window
pub const BASELINE_DAYS: i64 = 7;

/// Fewer samples than this for both steal and io latency means no baseline
pub const MIN_BASELINE_SAMPLES: usize = 10;

/// Trend threshold on the average relative deviation, in percent
const TREND_THRESHOLD: f64 = 10.0;

/// Values read from the baseline window
#[derive(Debug, Clone, Default)]
pub struct BaselineSamples {
    pub cpu_steal: Vec<f64>,
    pub io_latency: Vec<f64>,
    pub cpu_load: Vec<f64>,
}

/// Means of the window under analysis
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentMeans {
    pub cpu_steal: f64,
    pub io_latency: f64,
    pub cpu_load: f64,
}

impl BaselineSamples {
    pub fn is_sufficient(&self) -> bool {
        self.cpu_steal.len() >= MIN_BASELINE_SAMPLES
            || self.io_latency.len() >= MIN_BASELINE_SAMPLES
    }

    /// Absolute average deviation in percent and its direction.
    ///
    /// Metrics whose baseline mean is zero are left out of the average.
    pub fn deviation(&self, current: &CurrentMeans) -> (f64, BaselineStatus) {
        if !self.is_sufficient() {
            return (0.0, BaselineStatus::Stable);
        }

        let deviations: Vec<f64> = [
            (&self.cpu_steal, current.cpu_steal),
            (&self.io_latency, current.io_latency),
            (&self.cpu_load, current.cpu_load),
        ]
        .into_iter()
        .filter_map(|(baseline, now)| {
            let base = mean(baseline);
            (base > 0.0).then(|| (now - base) / base * 100.0)
        })
        .collect();

        let average = mean(&deviations);
        let status = if average > TREND_THRESHOLD {
            BaselineStatus::Degrading
        } else if average < -TREND_THRESHOLD {
            BaselineStatus::Improving
        } else {
            BaselineStatus::Stable
        };

        (average.abs(), status)
    }
}
