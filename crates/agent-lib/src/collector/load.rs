//! Load average sampling

use super::{read_file, ProcPaths};
use crate::error::CollectError;
use crate::models::SamplePayload;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadAverage {
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
    pub num_cpu: usize,
}

impl LoadAverage {
    /// One-minute load divided by the number of online cores
    pub fn normalized(&self) -> f64 {
        self.load1 / self.num_cpu.max(1) as f64
    }

    pub fn to_payload(&self) -> SamplePayload {
        SamplePayload::CpuLoad {
            load1: self.load1,
            load5: self.load5,
            load15: self.load15,
            num_cpu: self.num_cpu,
        }
    }
}

/// Parse the first three fields of `/proc/loadavg`
pub fn parse_loadavg(content: &str, num_cpu: usize) -> Result<LoadAverage, CollectError> {
    let fields: Vec<&str> = content.split_whitespace().take(3).collect();
    if fields.len() < 3 {
        return Err(CollectError::parse(
            "/proc/loadavg",
            format!("expected 3 load fields, found {}", fields.len()),
        ));
    }

    let parse = |raw: &str| {
        raw.parse::<f64>()
            .map_err(|e| CollectError::parse("/proc/loadavg", format!("'{raw}': {e}")))
    };

    Ok(LoadAverage {
        load1: parse(fields[0])?,
        load5: parse(fields[1])?,
        load15: parse(fields[2])?,
        num_cpu,
    })
}

#[derive(Debug, Clone)]
pub struct LoadSampler {
    loadavg_path: PathBuf,
    num_cpu: usize,
}

impl LoadSampler {
    pub fn new(paths: &ProcPaths) -> Self {
        let num_cpu = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_cpu_count(paths, num_cpu)
    }

    pub fn with_cpu_count(paths: &ProcPaths, num_cpu: usize) -> Self {
        Self {
            loadavg_path: paths.proc("loadavg"),
            num_cpu: num_cpu.max(1),
        }
    }

    pub fn sample(&self) -> Result<LoadAverage, CollectError> {
        parse_loadavg(&read_file(&self.loadavg_path)?, self.num_cpu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_loadavg() {
        let load = parse_loadavg("1.20 0.80 0.40 2/345 6789\n", 4).unwrap();
        assert_eq!(load.load1, 1.2);
        assert_eq!(load.load15, 0.4);
        assert!((load.normalized() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_parse_loadavg_short() {
        assert!(parse_loadavg("1.0 2.0\n", 1).is_err());
        assert!(parse_loadavg("", 1).is_err());
    }

    #[test]
    fn test_parse_loadavg_garbage() {
        assert!(parse_loadavg("a b c\n", 1).is_err());
    }

    #[test]
    fn test_normalized_guards_zero_cores() {
        let load = parse_loadavg("2.0 1.0 1.0", 0).unwrap();
        assert_eq!(load.normalized(), 2.0);
    }
}
