//! Disk latency probing
//!
//! Three kinds of measurement live here:
//! - a sequential write+fsync test over a buffer of random bytes
//! - a single 4KB aligned write/read that bypasses the page cache when the
//!   filesystem allows it
//! - cumulative block-device counters from `/proc/diskstats`
//!
//! The latency tests write real files, so the test directory is chosen to
//! avoid memory-backed filesystems.

use super::{read_file, ProcPaths};
use crate::error::CollectError;
use crate::models::{SamplePayload, StorageType};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Size and alignment of the random I/O block
pub const BLOCK_SIZE: usize = 4096;

/// Random I/O offsets are picked within this many blocks of the file start
const RANDOM_SPAN_BLOCKS: u64 = 256;

const SECTOR_SIZE: u64 = 512;

/// Filesystems that live in memory and would measure RAM, not disk
const MEMORY_FILESYSTEMS: [&str; 3] = ["tmpfs", "ramfs", "devtmpfs"];

/// Device name prefixes that never represent a physical disk
const VIRTUAL_DEVICE_PREFIXES: [&str; 4] = ["loop", "ram", "dm-", "zram"];

/// Default test directory candidates, in priority order
pub const DEFAULT_TEST_DIRS: [&str; 2] = ["/var/tmp", "/tmp"];

/// Result of one sequential write+fsync test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequentialLatency {
    pub write_ms: f64,
    pub sync_ms: f64,
}

impl SequentialLatency {
    pub fn total_ms(&self) -> f64 {
        self.write_ms + self.sync_ms
    }

    pub fn to_payload(&self) -> SamplePayload {
        SamplePayload::SequentialIo {
            write_ms: self.write_ms,
            sync_ms: self.sync_ms,
        }
    }
}

/// Result of one 4KB random write+read
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomIoResult {
    pub write_latency_ms: f64,
    pub read_latency_ms: f64,
    /// True only when both the write and the read bypassed the page cache
    pub used_direct_io: bool,
}

impl RandomIoResult {
    pub fn to_payload(&self) -> SamplePayload {
        SamplePayload::RandomIo {
            write_latency_ms: self.write_latency_ms,
            read_latency_ms: self.read_latency_ms,
            used_direct_io: self.used_direct_io,
        }
    }
}

/// Cumulative counters summed over physical disks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskCounters {
    pub read_ops: u64,
    pub write_ops: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub io_time_ms: u64,
    pub weighted_io_ms: u64,
    pub devices: usize,
}

impl DiskCounters {
    /// Share of `elapsed` the disks spent doing I/O, averaged over devices.
    ///
    /// Counter resets (the current reading below the previous one) yield 0.
    pub fn busy_percent_since(&self, previous: &DiskCounters, elapsed: Duration) -> f64 {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        if elapsed_ms <= 0.0 {
            return 0.0;
        }
        let io_ms = self.io_time_ms.saturating_sub(previous.io_time_ms) as f64;
        let devices = self.devices.max(1) as f64;
        (io_ms / (elapsed_ms * devices) * 100.0).clamp(0.0, 100.0)
    }

    pub fn to_payload(&self, busy_percent: Option<f64>) -> SamplePayload {
        SamplePayload::DiskStats {
            read_ops: self.read_ops,
            write_ops: self.write_ops,
            read_bytes: self.read_bytes,
            write_bytes: self.write_bytes,
            io_time_ms: self.io_time_ms,
            weighted_io_ms: self.weighted_io_ms,
            busy_percent,
        }
    }
}

/// How a test file should be opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create or truncate for writing
    Write,
    Read,
}

/// Open `path`, asking the kernel to bypass its page cache.
///
/// When the filesystem rejects the request the file is reopened with
/// buffered I/O. The flag reports which path was taken.
pub fn open_with_direct_io(path: &Path, mode: OpenMode) -> io::Result<(File, bool)> {
    let options = |direct: bool| {
        let mut options = OpenOptions::new();
        match mode {
            OpenMode::Write => options.write(true).create(true).truncate(true),
            OpenMode::Read => options.read(true),
        };
        #[cfg(target_os = "linux")]
        {
            use std::os::unix::fs::OpenOptionsExt;
            if direct {
                options.custom_flags(libc::O_DIRECT);
            }
        }
        #[cfg(not(target_os = "linux"))]
        let _ = direct;
        options
    };

    if cfg!(target_os = "linux") {
        match options(true).open(path) {
            Ok(file) => return Ok((file, true)),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "direct I/O rejected, using buffered I/O");
            }
        }
    }

    options(false).open(path).map(|file| (file, false))
}

/// Heap buffer whose visible slice starts on an `align`-byte boundary.
pub struct AlignedBuf {
    storage: Vec<u8>,
    offset: usize,
    len: usize,
}

impl AlignedBuf {
    /// `align` must be a power of two
    pub fn new(len: usize, align: usize) -> Self {
        debug_assert!(align.is_power_of_two());
        let storage = vec![0u8; len + align];
        let addr = storage.as_ptr() as usize;
        let offset = (align - addr % align) % align;
        Self {
            storage,
            offset,
            len,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.storage[self.offset..self.offset + self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.storage[self.offset..self.offset + self.len]
    }

    pub fn is_aligned(&self, align: usize) -> bool {
        self.as_slice().as_ptr() as usize % align == 0
    }
}

/// Test file removed when dropped, whatever the outcome of the test
struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    fn new(dir: &Path, label: &str) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        Self {
            path: dir.join(format!(
                "oversell-{label}-{}-{nanos}",
                std::process::id()
            )),
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove test file");
            }
        }
    }
}

fn millis(d: Duration) -> f64 {
    d.as_micros() as f64 / 1000.0
}

/// True when the longest mount point covering `path` is memory-backed.
///
/// `mounts` is the content of `/proc/mounts`.
pub fn is_memory_backed(path: &Path, mounts: &str) -> bool {
    let mut best: Option<(&str, &str)> = None;

    for line in mounts.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }
        let (mount_point, fs_type) = (fields[1], fields[2]);
        if !path.starts_with(mount_point) {
            continue;
        }
        if best.map_or(true, |(m, _)| mount_point.len() >= m.len()) {
            best = Some((mount_point, fs_type));
        }
    }

    best.is_some_and(|(_, fs_type)| MEMORY_FILESYSTEMS.contains(&fs_type))
}

fn is_writable(dir: &Path) -> bool {
    let probe = ScratchFile::new(dir, "write-check");
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&probe.path)
        .is_ok()
}

/// Pick the first candidate that exists, is writable and is not in memory.
///
/// Falls back to the current directory.
pub fn select_test_dir<P: AsRef<Path>>(candidates: &[P], mounts_path: &Path) -> PathBuf {
    let mounts = match fs::read_to_string(mounts_path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %mounts_path.display(), error = %e, "mount table unreadable");
            String::new()
        }
    };

    for candidate in candidates {
        let candidate = candidate.as_ref();
        let Ok(resolved) = fs::canonicalize(candidate) else {
            continue;
        };
        if !resolved.is_dir() {
            continue;
        }
        if is_memory_backed(&resolved, &mounts) {
            debug!(dir = %resolved.display(), "skipping memory-backed test directory");
            continue;
        }
        if !is_writable(&resolved) {
            debug!(dir = %resolved.display(), "skipping read-only test directory");
            continue;
        }
        return resolved;
    }

    warn!("no disk-backed test directory found, using current directory");
    PathBuf::from(".")
}

/// Whether a block device name denotes a partition rather than a whole disk
pub fn is_partition(name: &str) -> bool {
    if name.starts_with("nvme") || name.starts_with("mmcblk") {
        // nvme0n1p2, mmcblk0p1
        return match name.rfind('p') {
            Some(idx) if idx > 0 => {
                let suffix = &name[idx + 1..];
                !suffix.is_empty()
                    && suffix.bytes().all(|b| b.is_ascii_digit())
                    && name.as_bytes()[idx - 1].is_ascii_digit()
            }
            _ => false,
        };
    }

    // sda1, vda12, xvdb3
    let stem = name.trim_end_matches(|c: char| c.is_ascii_digit());
    stem.len() < name.len() && stem.ends_with(|c: char| c.is_ascii_alphabetic())
}

fn is_virtual_device(name: &str) -> bool {
    VIRTUAL_DEVICE_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Sum `/proc/diskstats` counters over whole physical disks
pub fn parse_diskstats(content: &str) -> Result<DiskCounters, CollectError> {
    let mut counters = DiskCounters::default();

    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 14 {
            continue;
        }
        let name = fields[2];
        if is_virtual_device(name) || is_partition(name) {
            continue;
        }

        let field = |idx: usize| -> Result<u64, CollectError> {
            fields[idx].parse().map_err(|e| {
                CollectError::parse("/proc/diskstats", format!("{name} field {idx}: {e}"))
            })
        };

        counters.read_ops += field(3)?;
        counters.read_bytes += field(5)? * SECTOR_SIZE;
        counters.write_ops += field(7)?;
        counters.write_bytes += field(9)? * SECTOR_SIZE;
        counters.io_time_ms += field(12)?;
        counters.weighted_io_ms += field(13)?;
        counters.devices += 1;
    }

    Ok(counters)
}

/// Map a random-read latency to a storage type; 2..=5 ms is left unknown
pub fn storage_type_from_latency(read_latency_ms: f64) -> StorageType {
    if read_latency_ms <= 0.0 {
        StorageType::Unknown
    } else if read_latency_ms < 2.0 {
        StorageType::Ssd
    } else if read_latency_ms > 5.0 {
        StorageType::Hdd
    } else {
        StorageType::Unknown
    }
}

/// Disk probe bound to one test directory
#[derive(Debug, Clone)]
pub struct DiskProbe {
    test_dir: PathBuf,
    test_size: usize,
    diskstats_path: PathBuf,
    sys_block_path: PathBuf,
}

impl DiskProbe {
    /// Probe writing `test_size` bytes per sequential test into the first
    /// safe directory among `candidates`
    pub fn new<P: AsRef<Path>>(paths: &ProcPaths, test_size: usize, candidates: &[P]) -> Self {
        let test_dir = select_test_dir(candidates, &paths.proc("mounts"));
        Self::with_test_dir(paths, test_size, test_dir)
    }

    pub fn with_test_dir(paths: &ProcPaths, test_size: usize, test_dir: impl Into<PathBuf>) -> Self {
        Self {
            test_dir: test_dir.into(),
            test_size,
            diskstats_path: paths.proc("diskstats"),
            sys_block_path: paths.sys("block"),
        }
    }

    pub fn test_dir(&self) -> &Path {
        &self.test_dir
    }

    /// Write the test buffer, fsync it, and time both steps separately
    pub fn sequential_latency(&self) -> Result<SequentialLatency, CollectError> {
        let mut data = vec![0u8; self.test_size];
        OsRng.try_fill_bytes(&mut data)?;

        let scratch = ScratchFile::new(&self.test_dir, "io-test");
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&scratch.path)
            .map_err(|e| CollectError::io("create", e))?;

        let write_start = Instant::now();
        file.write_all(&data)
            .map_err(|e| CollectError::io("write", e))?;
        let write_elapsed = write_start.elapsed();

        let sync_start = Instant::now();
        file.sync_all().map_err(|e| CollectError::io("fsync", e))?;
        let sync_elapsed = sync_start.elapsed();

        Ok(SequentialLatency {
            write_ms: millis(write_elapsed),
            sync_ms: millis(sync_elapsed),
        })
    }

    /// One aligned 4KB write+fsync then one aligned 4KB read at a random
    /// block offset
    pub fn random_io(&self) -> Result<RandomIoResult, CollectError> {
        let mut write_buf = AlignedBuf::new(BLOCK_SIZE, BLOCK_SIZE);
        OsRng.try_fill_bytes(write_buf.as_mut_slice())?;
        let mut read_buf = AlignedBuf::new(BLOCK_SIZE, BLOCK_SIZE);

        let offset = rand::thread_rng().gen_range(0..RANDOM_SPAN_BLOCKS) * BLOCK_SIZE as u64;
        let scratch = ScratchFile::new(&self.test_dir, "random-io");

        let (writer, write_direct) = open_with_direct_io(&scratch.path, OpenMode::Write)
            .map_err(|e| CollectError::io("open for write", e))?;
        let write_start = Instant::now();
        writer
            .write_all_at(write_buf.as_slice(), offset)
            .map_err(|e| CollectError::io("random write", e))?;
        writer
            .sync_all()
            .map_err(|e| CollectError::io("fsync", e))?;
        let write_elapsed = write_start.elapsed();
        drop(writer);

        let (reader, read_direct) = open_with_direct_io(&scratch.path, OpenMode::Read)
            .map_err(|e| CollectError::io("open for read", e))?;
        let read_start = Instant::now();
        reader
            .read_exact_at(read_buf.as_mut_slice(), offset)
            .map_err(|e| CollectError::io("random read", e))?;
        let read_elapsed = read_start.elapsed();

        if read_buf.as_slice() != write_buf.as_slice() {
            return Err(CollectError::io(
                "random read",
                io::Error::new(io::ErrorKind::InvalidData, "read back differs from written block"),
            ));
        }

        Ok(RandomIoResult {
            write_latency_ms: millis(write_elapsed),
            read_latency_ms: millis(read_elapsed),
            used_direct_io: write_direct && read_direct,
        })
    }

    /// Storage type from the rotational flag of the first physical disk
    pub fn detect_storage_type(&self) -> StorageType {
        let entries = match fs::read_dir(&self.sys_block_path) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(path = %self.sys_block_path.display(), error = %e, "cannot list block devices");
                return StorageType::Unknown;
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| !is_virtual_device(name))
            .collect();
        names.sort();

        for name in names {
            let flag = self
                .sys_block_path
                .join(&name)
                .join("queue")
                .join("rotational");
            match fs::read_to_string(&flag).as_deref().map(str::trim) {
                Ok("0") => return StorageType::Ssd,
                Ok("1") => return StorageType::Hdd,
                _ => continue,
            }
        }

        StorageType::Unknown
    }

    /// Sysfs lookup, falling back to one random read when sysfs is silent
    pub fn classify_storage(&self) -> StorageType {
        match self.detect_storage_type() {
            StorageType::Unknown => match self.random_io() {
                Ok(result) => storage_type_from_latency(result.read_latency_ms),
                Err(e) => {
                    debug!(error = %e, "latency-based storage detection failed");
                    StorageType::Unknown
                }
            },
            known => known,
        }
    }

    pub fn read_counters(&self) -> Result<DiskCounters, CollectError> {
        parse_diskstats(&read_file(&self.diskstats_path)?)
    }
}
