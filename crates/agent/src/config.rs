//! Agent configuration
//!
//! Loaded from an optional file (`OVERSELL_CONFIG`, default
//! `/etc/oversell/config.yaml`) overlaid with `OVERSELL_*` environment
//! variables, using `__` between section and key
//! (`OVERSELL_STORAGE__RETENTION_DAYS=14`).

use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use oversell_lib::collector::CollectionConfig;
use oversell_lib::report::ReportSchedule;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "/etc/oversell/config.yaml";

/// Ten years of samples
const MAX_RETENTION_DAYS: u32 = 3650;
const MAX_IO_TEST_SIZE_MB: u64 = 1024;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Host label attached to logs and reports
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// API server port for health/metrics/reports
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default)]
    pub collect: CollectSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub report: ReportSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectSection {
    #[serde(default = "default_cpu_interval")]
    pub cpu_interval_secs: u64,
    #[serde(default = "default_bench_interval")]
    pub bench_interval_secs: u64,
    #[serde(default = "default_io_interval")]
    pub io_interval_secs: u64,
    /// Size of the sequential write test
    #[serde(default = "default_io_test_size")]
    pub io_test_size_mb: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportSection {
    #[serde(default = "default_true")]
    pub daily: bool,
    /// Local time of day, `HH:MM`
    #[serde(default = "default_report_time")]
    pub time: String,
    #[serde(default = "default_true")]
    pub weekly: bool,
    /// 0 = Sunday
    #[serde(default)]
    pub weekly_day: u32,
    #[serde(default = "default_true")]
    pub monthly: bool,
    #[serde(default = "default_monthly_day")]
    pub monthly_day: u32,
}

fn default_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn default_api_port() -> u16 {
    9184
}

fn default_cpu_interval() -> u64 {
    300
}

fn default_bench_interval() -> u64 {
    1800
}

fn default_io_interval() -> u64 {
    900
}

fn default_io_test_size() -> u64 {
    4
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/var/lib/oversell/metrics.db")
}

fn default_retention_days() -> u32 {
    30
}

fn default_cleanup_interval() -> u64 {
    86_400
}

fn default_true() -> bool {
    true
}

fn default_report_time() -> String {
    "09:00".to_string()
}

fn default_monthly_day() -> u32 {
    1
}

impl Default for CollectSection {
    fn default() -> Self {
        Self {
            cpu_interval_secs: default_cpu_interval(),
            bench_interval_secs: default_bench_interval(),
            io_interval_secs: default_io_interval(),
            io_test_size_mb: default_io_test_size(),
        }
    }
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            retention_days: default_retention_days(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            daily: true,
            time: default_report_time(),
            weekly: true,
            weekly_day: 0,
            monthly: true,
            monthly_day: default_monthly_day(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self> {
        let path = std::env::var("OVERSELL_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());

        let builder = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix("OVERSELL")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        Self::from_builder(builder)
    }

    fn from_builder(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let config: AgentConfig = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the agent cannot run with
    pub fn validate(&self) -> Result<()> {
        let c = &self.collect;
        let s = &self.storage;
        for (name, value) in [
            ("collect.cpu_interval_secs", c.cpu_interval_secs),
            ("collect.bench_interval_secs", c.bench_interval_secs),
            ("collect.io_interval_secs", c.io_interval_secs),
            ("collect.io_test_size_mb", c.io_test_size_mb),
            ("storage.cleanup_interval_secs", s.cleanup_interval_secs),
            ("storage.retention_days", u64::from(s.retention_days)),
        ] {
            if value == 0 {
                bail!("{name} must be positive");
            }
        }

        if s.retention_days > MAX_RETENTION_DAYS {
            bail!(
                "storage.retention_days must be at most {MAX_RETENTION_DAYS}, got {}",
                s.retention_days
            );
        }
        if c.io_test_size_mb > MAX_IO_TEST_SIZE_MB {
            bail!(
                "collect.io_test_size_mb must be at most {MAX_IO_TEST_SIZE_MB}, got {}",
                c.io_test_size_mb
            );
        }

        self.report_time()?;
        if self.report.weekly_day > 6 {
            bail!(
                "report.weekly_day must be 0..=6 (0 = Sunday), got {}",
                self.report.weekly_day
            );
        }
        if !(1..=28).contains(&self.report.monthly_day) {
            bail!(
                "report.monthly_day must be 1..=28, got {}",
                self.report.monthly_day
            );
        }
        Ok(())
    }

    fn report_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.report.time, "%H:%M")
            .with_context(|| format!("report.time must be HH:MM, got '{}'", self.report.time))
    }

    /// Size of the sequential test buffer; bounded by `validate`
    pub fn io_test_size_bytes(&self) -> usize {
        let mb = self.collect.io_test_size_mb.min(MAX_IO_TEST_SIZE_MB) as usize;
        mb * 1024 * 1024
    }

    pub fn collection(&self) -> CollectionConfig {
        CollectionConfig {
            cpu_interval: Duration::from_secs(self.collect.cpu_interval_secs),
            bench_interval: Duration::from_secs(self.collect.bench_interval_secs),
            io_interval: Duration::from_secs(self.collect.io_interval_secs),
            cleanup_interval: Duration::from_secs(self.storage.cleanup_interval_secs),
            retention_days: self.storage.retention_days,
            ..CollectionConfig::default()
        }
    }

    pub fn schedule(&self) -> Result<ReportSchedule> {
        Ok(ReportSchedule {
            daily: self.report.daily,
            weekly: self.report.weekly,
            monthly: self.report.monthly,
            time: self.report_time()?,
            weekly_day: self.report.weekly_day,
            monthly_day: self.report.monthly_day,
        })
    }
}
