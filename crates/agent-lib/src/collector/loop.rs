//! Sampling scheduler
//!
//! Drives one timer per cadence (cpu, benchmark, disk), the retention sweep
//! and the report check from a single task. Each tick runs to completion
//! before the next event is handled; blocking probe work goes to
//! `spawn_blocking`. Reports are spawned as separate tasks so slow delivery
//! never delays sampling.

use super::{
    benchmark, CpuSampler, CpuUsage, DiskCounters, DiskProbe, LoadSampler, MemorySampler,
    ProcPaths,
};
use crate::error::CollectError;
use crate::health::{components, HealthRegistry};
use crate::models::{MetricSample, MetricType};
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::report::{ReportService, ScheduleTracker};
use crate::store::MetricStore;
use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Cadences of the collection loop
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// Steal/iowait and load (default: 5 minutes)
    pub cpu_interval: Duration,
    /// Synthetic CPU benchmark (default: 30 minutes)
    pub bench_interval: Duration,
    /// Disk latency tests, memory and disk counters (default: 15 minutes)
    pub io_interval: Duration,
    /// Retention sweep (default: daily)
    pub cleanup_interval: Duration,
    /// Report schedule check (default: 60 seconds)
    pub report_check_interval: Duration,
    pub retention_days: u32,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            cpu_interval: Duration::from_secs(300),
            bench_interval: Duration::from_secs(1800),
            io_interval: Duration::from_secs(900),
            cleanup_interval: Duration::from_secs(86_400),
            report_check_interval: Duration::from_secs(60),
            retention_days: 30,
        }
    }
}

/// A probe that failed during a pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeFailure {
    pub probe: String,
    pub error: String,
}

/// What one collection pass stored
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectSummary {
    /// Saved sample count per metric type
    pub saved: BTreeMap<MetricType, usize>,
    pub failures: Vec<ProbeFailure>,
}

impl CollectSummary {
    pub fn saved_total(&self) -> usize {
        self.saved.values().sum()
    }

    fn failed_component(&self, probes: &[&str]) -> Option<String> {
        let messages: Vec<String> = self
            .failures
            .iter()
            .filter(|f| probes.contains(&f.probe.as_str()))
            .map(|f| format!("{}: {}", f.probe, f.error))
            .collect();
        (!messages.is_empty()).then(|| messages.join("; "))
    }
}

struct CollectRequest {
    reply: oneshot::Sender<CollectSummary>,
}

/// Asks a running loop for an immediate full pass
#[derive(Clone)]
pub struct CollectHandle {
    tx: mpsc::Sender<CollectRequest>,
}

impl CollectHandle {
    pub async fn collect_now(&self) -> Result<CollectSummary> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CollectRequest { reply })
            .await
            .map_err(|_| anyhow::anyhow!("Collection loop is not running"))?;
        rx.await.context("Collection loop dropped the request")
    }
}

/// Probe names, used as metric labels and in failure summaries
mod probes {
    pub const CPU: &str = "cpu_sampler";
    pub const LOAD: &str = "load_sampler";
    pub const BENCH: &str = "cpu_bench";
    pub const SEQUENTIAL_IO: &str = "sequential_io";
    pub const RANDOM_IO: &str = "random_io";
    pub const DISK_STATS: &str = "disk_stats";
    pub const MEMORY: &str = "memory_sampler";
}

static CPU_PROBES: [&str; 3] = [probes::CPU, probes::LOAD, probes::BENCH];
static DISK_PROBES: [&str; 3] = [probes::SEQUENTIAL_IO, probes::RANDOM_IO, probes::DISK_STATS];
static MEMORY_PROBES: [&str; 1] = [probes::MEMORY];

/// Periodic sampler driving all probes into the store
pub struct CollectionLoop {
    config: CollectionConfig,
    paths: ProcPaths,
    store: Arc<MetricStore>,
    /// Owned by this loop only; `None` while a sample runs or after a lost task
    cpu: Option<CpuSampler>,
    load: LoadSampler,
    memory: MemorySampler,
    disk: Arc<DiskProbe>,
    /// Previous disk counters and when they were read
    previous_disk: Option<(DiskCounters, Instant)>,
    schedule: Option<ScheduleTracker>,
    reports: Option<ReportService>,
    requests: mpsc::Receiver<CollectRequest>,
    health: HealthRegistry,
    metrics: AgentMetrics,
    logger: StructuredLogger,
}

impl CollectionLoop {
    pub fn builder() -> CollectionLoopBuilder {
        CollectionLoopBuilder::new()
    }

    /// Run until `shutdown` fires. In-flight work finishes first.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            cpu_interval_secs = self.config.cpu_interval.as_secs(),
            bench_interval_secs = self.config.bench_interval.as_secs(),
            io_interval_secs = self.config.io_interval.as_secs(),
            "Starting collection loop"
        );

        let mut cpu_ticker = ticker(self.config.cpu_interval);
        let mut bench_ticker = ticker(self.config.bench_interval);
        let mut io_ticker = ticker(self.config.io_interval);
        let mut cleanup_ticker = ticker(self.config.cleanup_interval);
        let mut report_ticker = ticker(self.config.report_check_interval);

        loop {
            tokio::select! {
                _ = cpu_ticker.tick() => {
                    let mut summary = CollectSummary::default();
                    self.collect_cpu(&mut summary).await;
                    self.finish(&summary, true, false).await;
                }
                _ = bench_ticker.tick() => {
                    let mut summary = CollectSummary::default();
                    self.collect_bench(&mut summary).await;
                    self.finish(&summary, true, false).await;
                }
                _ = io_ticker.tick() => {
                    let mut summary = CollectSummary::default();
                    self.collect_io(&mut summary).await;
                    self.finish(&summary, false, true).await;
                }
                _ = cleanup_ticker.tick() => {
                    self.cleanup().await;
                }
                _ = report_ticker.tick() => {
                    self.check_reports();
                }
                Some(request) = self.requests.recv() => {
                    let summary = self.collect_all().await;
                    if request.reply.send(summary).is_err() {
                        debug!("Collect-now requester went away");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down collection loop");
                    break;
                }
            }
        }
    }

    /// One pass over every probe
    pub async fn collect_all(&mut self) -> CollectSummary {
        let mut summary = CollectSummary::default();
        self.collect_cpu(&mut summary).await;
        self.collect_bench(&mut summary).await;
        self.collect_io(&mut summary).await;
        self.finish(&summary, true, true).await;
        summary
    }

    /// Steal/iowait from the owned sampler, plus load average
    async fn collect_cpu(&mut self, summary: &mut CollectSummary) {
        let mut sampler = match self.cpu.take() {
            Some(sampler) => sampler,
            None => CpuSampler::new(&self.paths),
        };

        let started = Instant::now();
        let joined = tokio::task::spawn_blocking(move || {
            let usage = sampler.sample();
            (sampler, usage)
        })
        .await;
        self.metrics
            .observe_probe_latency(probes::CPU, started.elapsed().as_secs_f64());

        match joined {
            Ok((sampler, Ok(CpuUsage {
                steal_percent,
                iowait_percent,
            }))) => {
                self.cpu = Some(sampler);
                debug!(steal_percent, iowait_percent, "CPU sample");
                self.persist(
                    vec![
                        MetricSample::new(MetricType::CpuSteal, steal_percent),
                        MetricSample::new(MetricType::CpuIowait, iowait_percent),
                    ],
                    summary,
                )
                .await;
            }
            Ok((sampler, Err(e))) => {
                self.cpu = Some(sampler);
                self.record_failure(summary, probes::CPU, &e);
            }
            Err(e) => {
                // sampler state is gone; the next tick bootstraps a new one
                self.record_failure(summary, probes::CPU, &e);
            }
        }

        match self.load.sample() {
            Ok(load) => {
                let sample = MetricSample::new(MetricType::CpuLoad, load.normalized())
                    .with_payload(load.to_payload());
                self.persist(vec![sample], summary).await;
            }
            Err(e) => self.record_failure(summary, probes::LOAD, &e),
        }
    }

    async fn collect_bench(&mut self, summary: &mut CollectSummary) {
        match tokio::task::spawn_blocking(benchmark).await {
            Ok(duration_ms) => {
                self.metrics
                    .observe_probe_latency(probes::BENCH, duration_ms / 1000.0);
                debug!(duration_ms, "CPU benchmark");
                self.persist(
                    vec![MetricSample::new(MetricType::CpuBench, duration_ms)],
                    summary,
                )
                .await;
            }
            Err(e) => self.record_failure(summary, probes::BENCH, &e),
        }
    }

    /// Disk latency tests, memory and disk counters
    async fn collect_io(&mut self, summary: &mut CollectSummary) {
        let disk = Arc::clone(&self.disk);
        let started = Instant::now();
        let sequential = tokio::task::spawn_blocking(move || disk.sequential_latency()).await;
        self.metrics
            .observe_probe_latency(probes::SEQUENTIAL_IO, started.elapsed().as_secs_f64());
        match flatten(sequential) {
            Ok(latency) => {
                debug!(total_ms = latency.total_ms(), "Sequential I/O");
                let sample = MetricSample::new(MetricType::IoLatency, latency.total_ms())
                    .with_payload(latency.to_payload());
                self.persist(vec![sample], summary).await;
            }
            Err(e) => self.record_failure(summary, probes::SEQUENTIAL_IO, &e),
        }

        let disk = Arc::clone(&self.disk);
        let started = Instant::now();
        let random = tokio::task::spawn_blocking(move || disk.random_io()).await;
        self.metrics
            .observe_probe_latency(probes::RANDOM_IO, started.elapsed().as_secs_f64());
        match flatten(random) {
            Ok(result) => {
                debug!(
                    write_ms = result.write_latency_ms,
                    read_ms = result.read_latency_ms,
                    direct_io = result.used_direct_io,
                    "Random I/O"
                );
                let sample = MetricSample::new(MetricType::RandomIo, result.write_latency_ms)
                    .with_payload(result.to_payload());
                self.persist(vec![sample], summary).await;
            }
            Err(e) => self.record_failure(summary, probes::RANDOM_IO, &e),
        }

        match self.memory.sample() {
            Ok(mem) => {
                let sample = MetricSample::new(MetricType::Memory, mem.usage_percent())
                    .with_payload(mem.to_payload());
                self.persist(vec![sample], summary).await;
            }
            Err(e) => self.record_failure(summary, probes::MEMORY, &e),
        }

        match self.disk.read_counters() {
            Ok(counters) => {
                let now = Instant::now();
                let busy = self
                    .previous_disk
                    .map(|(prev, at)| counters.busy_percent_since(&prev, now - at));
                self.previous_disk = Some((counters, now));

                let sample = MetricSample::new(MetricType::DiskStats, busy.unwrap_or(0.0))
                    .with_payload(counters.to_payload(busy));
                self.persist(vec![sample], summary).await;
            }
            Err(e) => self.record_failure(summary, probes::DISK_STATS, &e),
        }
    }

    /// Write samples on a blocking thread
    async fn persist(&self, samples: Vec<MetricSample>, summary: &mut CollectSummary) {
        let store = Arc::clone(&self.store);
        let joined = tokio::task::spawn_blocking(move || {
            samples
                .into_iter()
                .map(|s| (s.metric_type, store.save(&s)))
                .collect::<Vec<_>>()
        })
        .await;

        let results = match joined {
            Ok(results) => results,
            Err(e) => {
                self.record_storage_failure("save", e.to_string()).await;
                return;
            }
        };

        let mut failed = false;
        for (metric_type, result) in results {
            match result {
                Ok(()) => {
                    self.metrics.inc_samples_saved(metric_type.as_str());
                    *summary.saved.entry(metric_type).or_default() += 1;
                }
                Err(e) => {
                    failed = true;
                    self.record_storage_failure("save", e.to_string()).await;
                }
            }
        }
        if !failed {
            self.health.set_healthy(components::STORE).await;
        }
    }

    async fn cleanup(&self) {
        let store = Arc::clone(&self.store);
        let days = self.config.retention_days;
        match tokio::task::spawn_blocking(move || store.cleanup(days)).await {
            Ok(Ok(removed)) => {
                self.metrics.add_samples_pruned(removed as u64);
                self.logger.log_retention_sweep(days, removed);
            }
            Ok(Err(e)) => self.record_storage_failure("cleanup", e.to_string()).await,
            Err(e) => self.record_storage_failure("cleanup", e.to_string()).await,
        }
    }

    /// Spawn a report task for every period that is due
    fn check_reports(&mut self) {
        let (Some(schedule), Some(reports)) = (self.schedule.as_mut(), self.reports.as_ref())
        else {
            return;
        };

        for period in schedule.due(Local::now().naive_local()) {
            info!(period = %period, "Scheduled report due");
            let reports = reports.clone();
            tokio::spawn(async move {
                if let Err(e) = reports.publish(period).await {
                    warn!(period = %period, error = %e, "Scheduled report failed");
                }
            });
        }
    }

    fn record_failure(
        &self,
        summary: &mut CollectSummary,
        probe: &str,
        error: &dyn std::fmt::Display,
    ) {
        self.logger.log_probe_failure(probe, error);
        self.metrics.inc_collection_errors(probe);
        summary.failures.push(ProbeFailure {
            probe: probe.to_string(),
            error: error.to_string(),
        });
    }

    async fn record_storage_failure(&self, operation: &str, error: String) {
        self.logger.log_storage_failure(operation, &error);
        self.metrics.inc_storage_errors();
        self.health
            .set_unhealthy(components::STORE, format!("{operation}: {error}"))
            .await;
    }

    /// Update health of the components a pass exercised
    async fn finish(&self, summary: &CollectSummary, cpu_pass: bool, io_pass: bool) {
        let mut groups: Vec<(&str, &[&str])> = Vec::new();
        if cpu_pass {
            groups.push((components::CPU_SAMPLER, &CPU_PROBES[..]));
        }
        if io_pass {
            groups.push((components::DISK_PROBE, &DISK_PROBES[..]));
            groups.push((components::MEMORY_SAMPLER, &MEMORY_PROBES[..]));
        }

        for (component, probe_names) in groups {
            match summary.failed_component(probe_names) {
                Some(message) => self.health.set_degraded(component, message).await,
                None => self.health.set_healthy(component).await,
            }
        }
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

fn flatten<T>(
    joined: Result<Result<T, CollectError>, tokio::task::JoinError>,
) -> Result<T, anyhow::Error> {
    Ok(joined.context("Probe task panicked")??)
}

/// Builder for the collection loop
pub struct CollectionLoopBuilder {
    config: CollectionConfig,
    paths: ProcPaths,
    store: Option<Arc<MetricStore>>,
    disk: Option<Arc<DiskProbe>>,
    reports: Option<(ReportService, ScheduleTracker)>,
    health: Option<HealthRegistry>,
    host: String,
    channel_size: usize,
}

impl CollectionLoopBuilder {
    pub fn new() -> Self {
        Self {
            config: CollectionConfig::default(),
            paths: ProcPaths::default(),
            store: None,
            disk: None,
            reports: None,
            health: None,
            host: "localhost".to_string(),
            channel_size: 8,
        }
    }

    pub fn config(mut self, config: CollectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn paths(mut self, paths: ProcPaths) -> Self {
        self.paths = paths;
        self
    }

    pub fn store(mut self, store: Arc<MetricStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn disk_probe(mut self, disk: Arc<DiskProbe>) -> Self {
        self.disk = Some(disk);
        self
    }

    /// Enable scheduled reports
    pub fn reports(mut self, service: ReportService, schedule: ScheduleTracker) -> Self {
        self.reports = Some((service, schedule));
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn build(self) -> Result<(CollectionLoop, CollectHandle)> {
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("Store is required"))?;
        let disk = self
            .disk
            .ok_or_else(|| anyhow::anyhow!("Disk probe is required"))?;
        let (reports, schedule) = match self.reports {
            Some((service, tracker)) => (Some(service), Some(tracker)),
            None => (None, None),
        };
        let (tx, requests) = mpsc::channel(self.channel_size);

        let collection_loop = CollectionLoop {
            load: LoadSampler::new(&self.paths),
            memory: MemorySampler::new(&self.paths),
            cpu: Some(CpuSampler::new(&self.paths)),
            paths: self.paths,
            config: self.config,
            store,
            disk,
            previous_disk: None,
            schedule,
            reports,
            requests,
            health: self.health.unwrap_or_default(),
            metrics: AgentMetrics::new(),
            logger: StructuredLogger::new(self.host),
        };

        Ok((collection_loop, CollectHandle { tx }))
    }
}

impl Default for CollectionLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_config_default() {
        let config = CollectionConfig::default();
        assert_eq!(config.cpu_interval, Duration::from_secs(300));
        assert_eq!(config.bench_interval, Duration::from_secs(1800));
        assert_eq!(config.io_interval, Duration::from_secs(900));
        assert_eq!(config.report_check_interval, Duration::from_secs(60));
        assert_eq!(config.retention_days, 30);
    }

    #[test]
    fn test_builder_requires_store() {
        let result = CollectionLoop::builder().build();
        assert!(result.is_err());
    }

    #[test]
    fn test_summary_failures_by_component() {
        let mut summary = CollectSummary::default();
        summary.failures.push(ProbeFailure {
            probe: probes::RANDOM_IO.to_string(),
            error: "EIO".to_string(),
        });
        assert!(summary.failed_component(&CPU_PROBES).is_none());
        assert_eq!(
            summary.failed_component(&DISK_PROBES).as_deref(),
            Some("random_io: EIO")
        );
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_run_future_is_send() {
        let store = Arc::new(MetricStore::open_in_memory().unwrap());
        let (collection_loop, _handle) = CollectionLoop::builder()
            .store(store)
            .disk_probe(Arc::new(DiskProbe::with_test_dir(
                &ProcPaths::default(),
                crate::collector::BLOCK_SIZE,
                ".",
            )))
            .build()
            .unwrap();
        let (_tx, rx) = broadcast::channel(1);
        let run = collection_loop.run(rx);
        assert_send(&run);
    }

    #[tokio::test]
    async fn test_collect_now_without_loop() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = CollectHandle { tx };
        assert!(handle.collect_now().await.is_err());
    }
}
