//! Integration tests for host sampling
//!
//! These tests build a mock procfs/sysfs tree so the samplers and the
//! collection loop run without touching the real kernel files.

#[cfg(test)]
mod mock_proc_tests {
    use crate::collector::{
        CpuSampler, DiskProbe, LoadSampler, MemorySampler, ProcPaths, BLOCK_SIZE,
    };
    use crate::models::StorageType;
    use std::path::Path;
    use tempfile::TempDir;
    use tokio::fs;

    const STAT: &str = "cpu  1000 0 500 8000 200 0 0 300 0 0\ncpu0 1000 0 500 8000 200 0 0 300 0 0\n";
    const STAT_LATER: &str = "cpu  1100 0 550 8700 300 0 0 350 0 0\ncpu0 1100 0 550 8700 300 0 0 350 0 0\n";

    const MEMINFO: &str = "\
MemTotal:        2000000 kB
MemFree:          200000 kB
MemAvailable:     500000 kB
Buffers:           50000 kB
Cached:           300000 kB
SwapTotal:       1000000 kB
SwapFree:         750000 kB
";

    const DISKSTATS: &str = "\
   8       0 vda 1000 10 8000 500 2000 20 16000 900 0 1200 1400 0 0 0 0
   8       1 vda1 900 10 7000 400 1900 20 15000 800 0 1100 1200 0 0 0 0
";

    /// Helper to create a mock `/proc` + `/sys` tree
    async fn create_mock_host(temp_dir: &TempDir, rotational: &str) -> ProcPaths {
        let proc_root = temp_dir.path().join("proc");
        let sys_root = temp_dir.path().join("sys");
        fs::create_dir_all(&proc_root).await.unwrap();

        fs::write(proc_root.join("stat"), STAT).await.unwrap();
        fs::write(proc_root.join("meminfo"), MEMINFO).await.unwrap();
        fs::write(proc_root.join("loadavg"), "1.00 0.50 0.25 1/100 4242\n")
            .await
            .unwrap();
        fs::write(proc_root.join("diskstats"), DISKSTATS).await.unwrap();
        fs::write(proc_root.join("mounts"), "").await.unwrap();

        let queue = sys_root.join("block").join("vda").join("queue");
        fs::create_dir_all(&queue).await.unwrap();
        fs::write(queue.join("rotational"), rotational).await.unwrap();

        let loop_queue = sys_root.join("block").join("loop0").join("queue");
        fs::create_dir_all(&loop_queue).await.unwrap();
        fs::write(loop_queue.join("rotational"), "1\n").await.unwrap();

        ProcPaths::new(proc_root, sys_root)
    }

    async fn scratch_dir(temp_dir: &TempDir) -> std::path::PathBuf {
        let dir = temp_dir.path().join("scratch");
        fs::create_dir_all(&dir).await.unwrap();
        dir
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_cpu_sampler_bootstrap_then_delta() {
        let temp_dir = TempDir::new().unwrap();
        let paths = create_mock_host(&temp_dir, "0\n").await;
        let mut sampler = CpuSampler::new(&paths);

        // Unchanged counters across the bootstrap read yield zeros
        let first = sampler.sample().unwrap();
        assert_eq!(first.steal_percent, 0.0);
        assert_eq!(first.iowait_percent, 0.0);
        assert!(sampler.previous().is_some());

        fs::write(paths.proc("stat"), STAT_LATER).await.unwrap();
        let second = sampler.sample().unwrap();
        assert!((second.steal_percent - 5.0).abs() < 1e-9);
        assert!((second.iowait_percent - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cpu_sampler_missing_stat() {
        let temp_dir = TempDir::new().unwrap();
        let paths = ProcPaths::new(temp_dir.path().join("absent"), temp_dir.path());
        let mut sampler = CpuSampler::new(&paths);

        assert!(sampler.sample().is_err());
        assert!(sampler.previous().is_none());
    }

    #[tokio::test]
    async fn test_memory_and_load_samplers() {
        let temp_dir = TempDir::new().unwrap();
        let paths = create_mock_host(&temp_dir, "0\n").await;

        let mem = MemorySampler::new(&paths).sample().unwrap();
        assert_eq!(mem.total_kb, 2_000_000);
        assert!((mem.available_percent() - 25.0).abs() < 1e-9);
        assert!((mem.usage_percent() - 75.0).abs() < 1e-9);
        assert!((mem.swap_usage_percent() - 25.0).abs() < 1e-9);

        let load = LoadSampler::with_cpu_count(&paths, 2).sample().unwrap();
        assert_eq!(load.load1, 1.0);
        assert!((load.normalized() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_disk_probe_storage_type() {
        let temp_dir = TempDir::new().unwrap();
        let scratch = scratch_dir(&temp_dir).await;

        let ssd = create_mock_host(&temp_dir, "0\n").await;
        let probe = DiskProbe::with_test_dir(&ssd, 4096, &scratch);
        assert_eq!(probe.detect_storage_type(), StorageType::Ssd);

        let hdd_dir = TempDir::new().unwrap();
        let hdd = create_mock_host(&hdd_dir, "1\n").await;
        let probe = DiskProbe::with_test_dir(&hdd, 4096, &scratch);
        assert_eq!(probe.detect_storage_type(), StorageType::Hdd);
        assert_eq!(probe.classify_storage(), StorageType::Hdd);

        let empty = ProcPaths::new(temp_dir.path(), temp_dir.path().join("nosys"));
        let probe = DiskProbe::with_test_dir(&empty, 4096, &scratch);
        assert_eq!(probe.detect_storage_type(), StorageType::Unknown);

        // No sysfs and no writable directory: nothing to fall back on
        let probe = DiskProbe::with_test_dir(&empty, 4096, temp_dir.path().join("gone"));
        assert_eq!(probe.classify_storage(), StorageType::Unknown);
    }

    #[tokio::test]
    async fn test_disk_probe_latency_tests_clean_up() {
        let temp_dir = TempDir::new().unwrap();
        let paths = create_mock_host(&temp_dir, "0\n").await;
        let scratch = scratch_dir(&temp_dir).await;
        let probe = DiskProbe::with_test_dir(&paths, 64 * 1024, &scratch);

        let sequential = probe.sequential_latency().unwrap();
        assert!(sequential.write_ms >= 0.0);
        assert!(sequential.sync_ms >= 0.0);
        assert!(sequential.total_ms() >= sequential.write_ms);

        let random = probe.random_io().unwrap();
        assert!(random.write_latency_ms >= 0.0);
        assert!(random.read_latency_ms >= 0.0);

        assert!(dir_is_empty(&scratch));
    }

    #[tokio::test]
    async fn test_disk_probe_unwritable_dir_fails() {
        let temp_dir = TempDir::new().unwrap();
        let paths = create_mock_host(&temp_dir, "0\n").await;
        let probe = DiskProbe::with_test_dir(&paths, BLOCK_SIZE, temp_dir.path().join("gone"));

        assert!(probe.sequential_latency().is_err());
        assert!(probe.random_io().is_err());
    }

    #[tokio::test]
    async fn test_disk_probe_counters() {
        let temp_dir = TempDir::new().unwrap();
        let paths = create_mock_host(&temp_dir, "0\n").await;
        let probe = DiskProbe::with_test_dir(&paths, BLOCK_SIZE, temp_dir.path());

        let counters = probe.read_counters().unwrap();
        assert_eq!(counters.devices, 1);
        assert_eq!(counters.read_ops, 1000);
        assert_eq!(counters.read_bytes, 8000 * 512);
        assert_eq!(counters.io_time_ms, 1200);
    }

    #[tokio::test]
    async fn test_select_test_dir_skips_tmpfs() {
        let temp_dir = TempDir::new().unwrap();
        let paths = create_mock_host(&temp_dir, "0\n").await;

        let ram = temp_dir.path().join("ram");
        let disk = temp_dir.path().join("disk");
        fs::create_dir_all(&ram).await.unwrap();
        fs::create_dir_all(&disk).await.unwrap();
        let ram_resolved = std::fs::canonicalize(&ram).unwrap();
        let disk_resolved = std::fs::canonicalize(&disk).unwrap();

        let mounts = format!("tmpfs {} tmpfs rw,nosuid 0 0\n", ram_resolved.display());
        fs::write(paths.proc("mounts"), mounts).await.unwrap();

        let missing = temp_dir.path().join("missing");
        let probe = DiskProbe::new(&paths, BLOCK_SIZE, &[missing, ram, disk]);
        assert_eq!(probe.test_dir(), disk_resolved.as_path());
        assert!(dir_is_empty(&disk_resolved));
    }

    #[tokio::test]
    async fn test_select_test_dir_falls_back_to_cwd() {
        let temp_dir = TempDir::new().unwrap();
        let paths = create_mock_host(&temp_dir, "0\n").await;
        let ram = temp_dir.path().join("ram");
        fs::create_dir_all(&ram).await.unwrap();
        let resolved = std::fs::canonicalize(&ram).unwrap();
        fs::write(
            paths.proc("mounts"),
            format!("ramfs {} ramfs rw 0 0\n", resolved.display()),
        )
        .await
        .unwrap();

        let probe = DiskProbe::new(&paths, BLOCK_SIZE, &[ram]);
        assert_eq!(probe.test_dir(), Path::new("."));
    }
}

#[cfg(test)]
mod collection_loop_tests {
    use crate::collector::{CollectionConfig, CollectionLoop, DiskProbe, ProcPaths};
    use crate::health::{components, ComponentStatus, HealthRegistry};
    use crate::models::{MetricType, SamplePayload};
    use crate::store::MetricStore;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::fs;
    use tokio::sync::broadcast;

    async fn mock_host(temp_dir: &TempDir) -> ProcPaths {
        let proc_root = temp_dir.path().join("proc");
        fs::create_dir_all(&proc_root).await.unwrap();
        fs::write(proc_root.join("stat"), "cpu  10 0 10 80 0 0 0 0 0 0\n")
            .await
            .unwrap();
        fs::write(
            proc_root.join("meminfo"),
            "MemTotal: 1000 kB\nMemFree: 100 kB\nMemAvailable: 400 kB\n",
        )
        .await
        .unwrap();
        fs::write(proc_root.join("loadavg"), "0.50 0.40 0.30 1/80 99\n")
            .await
            .unwrap();
        fs::write(
            proc_root.join("diskstats"),
            "   8       0 sda 10 0 80 5 20 0 160 9 0 12 14 0 0 0 0\n",
        )
        .await
        .unwrap();
        ProcPaths::new(proc_root, temp_dir.path().join("sys"))
    }

    fn slow_config() -> CollectionConfig {
        let hour = Duration::from_secs(3600);
        CollectionConfig {
            cpu_interval: hour,
            bench_interval: hour,
            io_interval: hour,
            cleanup_interval: hour,
            report_check_interval: hour,
            retention_days: 30,
        }
    }

    async fn build(
        temp_dir: &TempDir,
        paths: ProcPaths,
        health: HealthRegistry,
    ) -> (CollectionLoop, crate::collector::CollectHandle, Arc<MetricStore>) {
        let store = Arc::new(MetricStore::open_in_memory().unwrap());
        let scratch = temp_dir.path().join("scratch");
        fs::create_dir_all(&scratch).await.unwrap();
        let disk = Arc::new(DiskProbe::with_test_dir(&paths, 16 * 1024, scratch));

        let (collection_loop, handle) = CollectionLoop::builder()
            .config(slow_config())
            .paths(paths)
            .store(store.clone())
            .disk_probe(disk)
            .health(health)
            .host("vps-test")
            .build()
            .unwrap();
        (collection_loop, handle, store)
    }

    #[tokio::test]
    async fn test_collect_all_saves_every_metric() {
        let temp_dir = TempDir::new().unwrap();
        let paths = mock_host(&temp_dir).await;
        let health = HealthRegistry::new();
        health.register_all().await;
        let (mut collection_loop, _handle, store) = build(&temp_dir, paths, health.clone()).await;

        let summary = collection_loop.collect_all().await;
        assert!(summary.failures.is_empty(), "{:?}", summary.failures);
        assert_eq!(summary.saved_total(), MetricType::ALL.len());
        for metric_type in MetricType::ALL {
            assert_eq!(store.count(metric_type).unwrap(), 1, "{metric_type}");
        }

        let memory = store.latest(MetricType::Memory).unwrap().unwrap();
        assert!((memory.value - 60.0).abs() < 1e-9);

        // First disk reading has no busy percentage yet
        let disk = store.latest(MetricType::DiskStats).unwrap().unwrap();
        assert_eq!(disk.value, 0.0);
        assert!(matches!(
            disk.extra,
            Some(SamplePayload::DiskStats {
                busy_percent: None,
                ..
            })
        ));

        collection_loop.collect_all().await;
        let disk = store
            .query(
                MetricType::DiskStats,
                chrono::Utc::now() - chrono::Duration::hours(1),
                chrono::Utc::now() + chrono::Duration::hours(1),
            )
            .unwrap();
        assert_eq!(disk.len(), 2);
        assert!(matches!(
            disk[1].extra,
            Some(SamplePayload::DiskStats {
                busy_percent: Some(_),
                ..
            })
        ));

        let status = health.health().await;
        assert_eq!(status.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_probe_failure_degrades_component() {
        let temp_dir = TempDir::new().unwrap();
        let paths = mock_host(&temp_dir).await;
        fs::remove_file(paths.proc("diskstats")).await.unwrap();
        let health = HealthRegistry::new();
        health.register_all().await;
        let (mut collection_loop, _handle, store) = build(&temp_dir, paths, health.clone()).await;

        let summary = collection_loop.collect_all().await;
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].probe, "disk_stats");
        assert_eq!(store.count(MetricType::DiskStats).unwrap(), 0);
        assert_eq!(store.count(MetricType::IoLatency).unwrap(), 1);

        let status = health.health().await;
        assert_eq!(
            status.components[components::DISK_PROBE].status,
            ComponentStatus::Degraded
        );
        assert_eq!(
            status.components[components::CPU_SAMPLER].status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_run_collect_now_and_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        let paths = mock_host(&temp_dir).await;
        let (collection_loop, handle, store) =
            build(&temp_dir, paths, HealthRegistry::new()).await;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(collection_loop.run(shutdown_rx));

        let summary = handle.collect_now().await.unwrap();
        assert_eq!(summary.saved[&MetricType::CpuSteal], 1);
        assert!(store.count(MetricType::CpuBench).unwrap() >= 1);

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(10), task)
            .await
            .unwrap()
            .unwrap();

        assert!(handle.collect_now().await.is_err());
    }
}
