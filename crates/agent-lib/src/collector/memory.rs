//! Memory availability from `/proc/meminfo`

use super::{read_file, ProcPaths};
use crate::error::CollectError;
use crate::models::SamplePayload;
use std::path::PathBuf;

/// Raw memory counters in KB
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub total_kb: u64,
    pub free_kb: u64,
    pub available_kb: u64,
    pub buffers_kb: u64,
    pub cached_kb: u64,
    pub swap_total_kb: u64,
    pub swap_free_kb: u64,
}

impl MemoryStats {
    pub fn usage_percent(&self) -> f64 {
        if self.total_kb == 0 {
            return 0.0;
        }
        let used = self.total_kb.saturating_sub(self.available_kb);
        used as f64 / self.total_kb as f64 * 100.0
    }

    pub fn available_percent(&self) -> f64 {
        if self.total_kb == 0 {
            return 0.0;
        }
        self.available_kb as f64 / self.total_kb as f64 * 100.0
    }

    pub fn swap_usage_percent(&self) -> f64 {
        if self.swap_total_kb == 0 {
            return 0.0;
        }
        let used = self.swap_total_kb.saturating_sub(self.swap_free_kb);
        used as f64 / self.swap_total_kb as f64 * 100.0
    }

    pub fn to_payload(&self) -> SamplePayload {
        SamplePayload::Memory {
            total_kb: self.total_kb,
            available_kb: self.available_kb,
            available_percent: self.available_percent(),
            swap_usage_percent: self.swap_usage_percent(),
        }
    }
}

/// Parse `/proc/meminfo` contents.
///
/// Kernels without `MemAvailable` get an estimate of free + buffers + cached.
pub fn parse_meminfo(content: &str) -> Result<MemoryStats, CollectError> {
    let mut stats = MemoryStats::default();
    let mut total = None;
    let mut available = None;

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(raw)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(value) = raw.parse::<u64>() else {
            continue;
        };

        match key.trim_end_matches(':') {
            "MemTotal" => total = Some(value),
            "MemFree" => stats.free_kb = value,
            "MemAvailable" => available = Some(value),
            "Buffers" => stats.buffers_kb = value,
            "Cached" => stats.cached_kb = value,
            "SwapTotal" => stats.swap_total_kb = value,
            "SwapFree" => stats.swap_free_kb = value,
            _ => {}
        }
    }

    stats.total_kb = total.ok_or_else(|| CollectError::parse("/proc/meminfo", "no MemTotal"))?;
    stats.available_kb =
        available.unwrap_or(stats.free_kb + stats.buffers_kb + stats.cached_kb);

    Ok(stats)
}

#[derive(Debug, Clone)]
pub struct MemorySampler {
    meminfo_path: PathBuf,
}

impl MemorySampler {
    pub fn new(paths: &ProcPaths) -> Self {
        Self {
            meminfo_path: paths.proc("meminfo"),
        }
    }

    pub fn sample(&self) -> Result<MemoryStats, CollectError> {
        parse_meminfo(&read_file(&self.meminfo_path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &str = "MemTotal:        2000000 kB\n\
                           MemFree:          200000 kB\n\
                           MemAvailable:    1500000 kB\n\
                           Buffers:           50000 kB\n\
                           Cached:           400000 kB\n\
                           SwapCached:            0 kB\n\
                           SwapTotal:        1000000 kB\n\
                           SwapFree:          750000 kB\n\
                           HugePages_Total:       0\n";

    #[test]
    fn test_parse_meminfo() {
        let stats = parse_meminfo(MEMINFO).unwrap();
        assert_eq!(stats.total_kb, 2_000_000);
        assert_eq!(stats.available_kb, 1_500_000);
        assert!((stats.available_percent() - 75.0).abs() < 1e-9);
        assert!((stats.usage_percent() - 25.0).abs() < 1e-9);
        assert!((stats.swap_usage_percent() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_available_estimated_on_old_kernels() {
        let content = "MemTotal: 1000 kB\nMemFree: 100 kB\nBuffers: 50 kB\nCached: 250 kB\n";
        let stats = parse_meminfo(content).unwrap();
        assert_eq!(stats.available_kb, 400);
        assert!((stats.available_percent() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_total_is_error() {
        assert!(parse_meminfo("MemFree: 100 kB\n").is_err());
    }

    #[test]
    fn test_no_swap() {
        let stats = parse_meminfo("MemTotal: 1000 kB\nMemAvailable: 500 kB\n").unwrap();
        assert_eq!(stats.swap_usage_percent(), 0.0);
    }

    #[test]
    fn test_payload() {
        let stats = parse_meminfo(MEMINFO).unwrap();
        match stats.to_payload() {
            SamplePayload::Memory {
                total_kb,
                available_percent,
                ..
            } => {
                assert_eq!(total_kb, 2_000_000);
                assert!((available_percent - 75.0).abs() < 1e-9);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }
}
