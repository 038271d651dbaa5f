//! CPU contention sampling
//!
//! Steal and iowait are derived from the aggregate `cpu` line of
//! `/proc/stat` as deltas against the previous snapshot held by the sampler.

use super::{read_file, ProcPaths};
use crate::error::CollectError;
use std::hint::black_box;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Delay between the two reads of the bootstrap sample
const BOOTSTRAP_DELAY: Duration = Duration::from_millis(100);

/// Primes counted by the synthetic benchmark
const BENCH_PRIME_TARGET: usize = 10_000;

/// Cumulative jiffy counters from the aggregate `cpu` line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
    pub guest_nice: u64,
}

impl CpuTimes {
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
            + self.guest
            + self.guest_nice
    }
}

/// Steal and iowait share of CPU time since the previous sample, in percent
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuUsage {
    pub steal_percent: f64,
    pub iowait_percent: f64,
}

impl CpuUsage {
    /// Usage between two snapshots; a zero total delta yields zeros
    pub fn between(prev: &CpuTimes, current: &CpuTimes) -> Self {
        let total = current.total().saturating_sub(prev.total());
        if total == 0 {
            return Self::default();
        }
        let steal = current.steal.saturating_sub(prev.steal);
        let iowait = current.iowait.saturating_sub(prev.iowait);

        Self {
            steal_percent: steal as f64 / total as f64 * 100.0,
            iowait_percent: iowait as f64 / total as f64 * 100.0,
        }
    }
}

/// Parse the aggregate `cpu` line of `/proc/stat`.
///
/// The line must carry all ten counters; a short line is an error, never
/// zero-filled.
pub fn parse_proc_stat(content: &str) -> Result<CpuTimes, CollectError> {
    let line = content
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| CollectError::parse("/proc/stat", "no aggregate cpu line"))?;

    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 11 {
        return Err(CollectError::parse(
            "/proc/stat",
            format!("cpu line has {} fields", fields.len()),
        ));
    }

    let mut values = [0u64; 10];
    for (slot, raw) in values.iter_mut().zip(&fields[1..11]) {
        *slot = raw
            .parse()
            .map_err(|e| CollectError::parse("/proc/stat", format!("counter '{raw}': {e}")))?;
    }

    Ok(CpuTimes {
        user: values[0],
        nice: values[1],
        system: values[2],
        idle: values[3],
        iowait: values[4],
        irq: values[5],
        softirq: values[6],
        steal: values[7],
        guest: values[8],
        guest_nice: values[9],
    })
}

/// Stateful steal/iowait sampler.
///
/// Holds the previous kernel snapshot, so it must be owned by exactly one
/// task. Dropping it and building a new one restarts the bootstrap.
#[derive(Debug)]
pub struct CpuSampler {
    stat_path: PathBuf,
    previous: Option<CpuTimes>,
}

impl CpuSampler {
    pub fn new(paths: &ProcPaths) -> Self {
        Self {
            stat_path: paths.proc("stat"),
            previous: None,
        }
    }

    fn read_times(&self) -> Result<CpuTimes, CollectError> {
        parse_proc_stat(&read_file(&self.stat_path)?)
    }

    /// Sample steal and iowait since the previous call.
    ///
    /// The first call reads twice, [`BOOTSTRAP_DELAY`] apart, and blocks the
    /// calling thread for that long.
    pub fn sample(&mut self) -> Result<CpuUsage, CollectError> {
        let mut current = self.read_times()?;

        let previous = match self.previous {
            Some(prev) => prev,
            None => {
                let first = current;
                self.previous = Some(first);
                std::thread::sleep(BOOTSTRAP_DELAY);
                current = self.read_times()?;
                first
            }
        };

        self.previous = Some(current);
        Ok(CpuUsage::between(&previous, &current))
    }

    /// Last snapshot read, if any
    pub fn previous(&self) -> Option<&CpuTimes> {
        self.previous.as_ref()
    }
}

/// Count primes by trial division and return the wall-clock time in ms.
///
/// Over time the spread of this duration exposes CPU contention that steal
/// accounting does not show.
pub fn benchmark() -> f64 {
    let start = Instant::now();
    black_box(count_primes(black_box(BENCH_PRIME_TARGET)));
    start.elapsed().as_micros() as f64 / 1000.0
}

/// Returns the `target`-th prime
fn count_primes(target: usize) -> u64 {
    let mut count = 0;
    let mut n = 1u64;
    while count < target {
        n += 1;
        if is_prime(n) {
            count += 1;
        }
    }
    n
}

fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n == 2 {
        return true;
    }
    if n % 2 == 0 {
        return false;
    }
    let mut i = 3;
    while i * i <= n {
        if n % i == 0 {
            return false;
        }
        i += 2;
    }
    true
}
