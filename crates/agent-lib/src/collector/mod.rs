//! Host contention probes
//!
//! This module reads kernel counters from procfs and sysfs and runs the
//! disk latency tests. All probes are synchronous; the collection loop runs
//! them on blocking threads.

mod cpu;
mod disk;
mod load;
mod r#loop;
mod memory;

#[cfg(test)]
mod tests;

pub use cpu::{benchmark, parse_proc_stat, CpuSampler, CpuTimes, CpuUsage};
pub use disk::{
    is_memory_backed, is_partition, open_with_direct_io, parse_diskstats, select_test_dir,
    storage_type_from_latency, AlignedBuf, DiskCounters, DiskProbe, OpenMode, RandomIoResult,
    SequentialLatency, BLOCK_SIZE, DEFAULT_TEST_DIRS,
};
pub use load::{parse_loadavg, LoadAverage, LoadSampler};
pub use memory::{parse_meminfo, MemorySampler, MemoryStats};
pub use r#loop::{
    CollectHandle, CollectSummary, CollectionConfig, CollectionLoop, CollectionLoopBuilder,
    ProbeFailure,
};

use crate::error::CollectError;
use std::path::{Path, PathBuf};

/// Roots of the kernel pseudo-filesystems; tests point these at a mock tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcPaths {
    pub proc_root: PathBuf,
    pub sys_root: PathBuf,
}

impl Default for ProcPaths {
    fn default() -> Self {
        Self::new("/proc", "/sys")
    }
}

impl ProcPaths {
    pub fn new(proc_root: impl Into<PathBuf>, sys_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            sys_root: sys_root.into(),
        }
    }

    pub fn proc(&self, name: &str) -> PathBuf {
        self.proc_root.join(name)
    }

    pub fn sys(&self, name: &str) -> PathBuf {
        self.sys_root.join(name)
    }
}

pub(crate) fn read_file(path: &Path) -> Result<String, CollectError> {
    std::fs::read_to_string(path).map_err(|e| CollectError::read(path, e))
}
