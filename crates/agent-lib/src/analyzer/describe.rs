//! Short per-dimension findings for report consumers.
//!
//! These use their own thresholds and are display text only; nothing
//! numeric depends on them.

use crate::models::{BaselineStatus, StorageType};

pub fn cpu_steal(avg: f64, max: f64) -> String {
    let level = if avg < 3.0 {
        "low"
    } else if avg < 8.0 {
        "moderate"
    } else {
        "severe"
    };
    format!("{level} (avg {avg:.2}%, max {max:.2}%)")
}

pub fn cpu_iowait(avg: f64) -> String {
    let level = if avg < 5.0 {
        "low"
    } else if avg < 15.0 {
        "moderate"
    } else {
        "severe"
    };
    format!("{level} (avg {avg:.2}%)")
}

pub fn cpu_stability(cv: f64) -> String {
    let level = if cv < 0.05 {
        "stable"
    } else if cv < 0.15 {
        "slight jitter"
    } else {
        "unstable"
    };
    format!("{level} (cv {cv:.3})")
}

fn latency_level(value: f64, threshold: f64) -> &'static str {
    if value < threshold {
        "low"
    } else if value < threshold * 2.5 {
        "moderate"
    } else {
        "severe"
    }
}

pub fn io_latency(p95: f64, storage: StorageType) -> String {
    let threshold = match storage {
        StorageType::Hdd => 50.0,
        _ => 20.0,
    };
    format!("{} (p95 {p95:.1}ms, {storage})", latency_level(p95, threshold))
}

pub fn random_io(write_avg: f64, read_avg: f64, storage: StorageType) -> String {
    let threshold = match storage {
        StorageType::Hdd => 100.0,
        _ => 30.0,
    };
    format!(
        "{} (write {write_avg:.1}ms, read {read_avg:.1}ms)",
        latency_level(write_avg, threshold)
    )
}

pub fn disk_busy(percent: f64) -> String {
    let level = if percent < 30.0 {
        "low"
    } else if percent < 60.0 {
        "moderate"
    } else {
        "high"
    };
    format!("{level} ({percent:.1}%)")
}

pub fn memory(available_percent: f64) -> String {
    let level = if available_percent > 80.0 {
        "normal"
    } else if available_percent > 50.0 {
        "low"
    } else {
        "insufficient"
    };
    format!("{level} ({available_percent:.1}% available)")
}

/// Load is shown for reference and never scored
pub fn cpu_load(avg: f64, max: f64) -> String {
    let level = if avg < 0.7 {
        "idle"
    } else if avg < 1.0 {
        "normal"
    } else if avg < 2.0 {
        "elevated"
    } else {
        "overloaded"
    };
    format!("{avg:.2} per core, max {max:.2} ({level}, reference only)")
}

pub fn baseline(deviation: f64, status: BaselineStatus) -> String {
    match status {
        BaselineStatus::Stable => format!("stable ({deviation:.1}%)"),
        BaselineStatus::Improving => format!("improving ({deviation:.1}%)"),
        BaselineStatus::Degrading if deviation > 25.0 => {
            format!("clearly degrading ({deviation:.1}%)")
        }
        BaselineStatus::Degrading => format!("slightly degrading ({deviation:.1}%)"),
    }
}
