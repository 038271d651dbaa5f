//! Descriptive statistics over sample values

use crate::models::MetricSample;
use chrono::{DateTime, Utc};

pub fn values(samples: &[MetricSample]) -> Vec<f64> {
    samples.iter().map(|s| s.value).collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::max).unwrap_or(0.0)
}

/// Largest value and the time it was first seen
pub fn peak(samples: &[MetricSample]) -> Option<(f64, DateTime<Utc>)> {
    samples.iter().fold(None, |best, s| match best {
        Some((v, _)) if v >= s.value => best,
        _ => Some((s.value, s.timestamp)),
    })
}

/// Nearest-rank percentile: `ceil(p/100 * n) - 1`, clamped to the sample range
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = (p / 100.0 * sorted.len() as f64).ceil() as i64 - 1;
    let idx = rank.clamp(0, sorted.len() as i64 - 1) as usize;
    sorted[idx]
}

/// Population standard deviation over the mean; 0 for fewer than two
/// values or a zero mean
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean(values);
    if mean == 0.0 {
        return 0.0;
    }
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (sum_sq / values.len() as f64).sqrt() / mean
}
