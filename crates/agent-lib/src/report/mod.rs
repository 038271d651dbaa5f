//! Report generation and delivery
//!
//! The analyzer output is wrapped in a [`Report`] and handed to every
//! configured [`ReportSink`]. An optional [`Narrator`] may attach free text
//! first; its failure never blocks delivery.

mod schedule;

pub use schedule::{ReportSchedule, ScheduleTracker};

use crate::analyzer::RiskAnalyzer;
use crate::health::{components, HealthRegistry};
use crate::models::PeriodStats;
use crate::observability::{AgentMetrics, StructuredLogger};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reporting window ending at the time of the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl ReportPeriod {
    pub const ALL: [ReportPeriod; 3] = [ReportPeriod::Daily, ReportPeriod::Weekly, ReportPeriod::Monthly];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportPeriod::Daily => "daily",
            ReportPeriod::Weekly => "weekly",
            ReportPeriod::Monthly => "monthly",
        }
    }

    /// `(start, end)` of the window ending at `end`
    pub fn window(&self, end: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = match self {
            ReportPeriod::Daily => end - Duration::days(1),
            ReportPeriod::Weekly => end - Duration::days(7),
            ReportPeriod::Monthly => end
                .checked_sub_months(Months::new(1))
                .unwrap_or(end - Duration::days(30)),
        };
        (start, end)
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportPeriod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        ReportPeriod::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown report period '{s}'"))
    }
}

/// Computed stats plus an optional narrative, ready for delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub host: String,
    pub generated_at: DateTime<Utc>,
    pub stats: PeriodStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
}

/// Destination for finished reports (chat bot, mail, log, ...)
#[async_trait]
pub trait ReportSink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, report: &Report) -> Result<()>;
}

/// Produces a free-text commentary on a period
#[async_trait]
pub trait Narrator: Send + Sync {
    async fn narrate(&self, period: ReportPeriod, stats: &PeriodStats) -> Result<String>;
}

/// Sink that writes the report into the structured log
pub struct LogSink;

#[async_trait]
impl ReportSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, report: &Report) -> Result<()> {
        let stats = &report.stats;
        let busiest: Vec<u32> = stats.busiest_hours().iter().map(|h| h.hour).collect();
        let findings = serde_json::to_string(&stats.risk_details)
            .context("Failed to encode findings")?;

        info!(
            event = "report",
            host = %report.host,
            period = %stats.period,
            start = %stats.start,
            end = %stats.end,
            storage_type = %stats.storage_type,
            score = stats.total_score,
            risk_level = %stats.risk_level,
            cpu_steal_avg = stats.cpu_steal_avg,
            cpu_iowait_avg = stats.cpu_iowait_avg,
            io_latency_p95 = stats.io_latency_p95,
            baseline = %stats.baseline_status,
            busiest_hours = ?busiest,
            findings = %findings,
            narrative = report.narrative.as_deref().unwrap_or(""),
            "Oversell report"
        );
        Ok(())
    }
}

/// Runs the analyzer for a period and fans the result out to sinks
#[derive(Clone)]
pub struct ReportService {
    analyzer: RiskAnalyzer,
    host: String,
    narrator: Option<Arc<dyn Narrator>>,
    sinks: Vec<Arc<dyn ReportSink>>,
    health: Option<HealthRegistry>,
    metrics: AgentMetrics,
    logger: StructuredLogger,
}

impl ReportService {
    pub fn new(analyzer: RiskAnalyzer, host: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            analyzer,
            logger: StructuredLogger::new(host.clone()),
            host,
            narrator: None,
            sinks: Vec::new(),
            health: None,
            metrics: AgentMetrics::new(),
        }
    }

    pub fn with_narrator(mut self, narrator: Arc<dyn Narrator>) -> Self {
        self.narrator = Some(narrator);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn analyzer(&self) -> &RiskAnalyzer {
        &self.analyzer
    }

    /// Compute a report for the window ending now.
    ///
    /// The analyzer runs on a blocking thread since it queries SQLite.
    pub async fn generate(&self, period: ReportPeriod) -> Result<Report> {
        let (start, end) = period.window(Utc::now());
        let analyzer = self.analyzer.clone();

        let stats = tokio::task::spawn_blocking(move || analyzer.analyze(period.as_str(), start, end))
            .await
            .context("Analyzer task panicked")?
            .with_context(|| format!("Failed to analyze {period} period"))?;

        let narrative = match &self.narrator {
            Some(narrator) => match narrator.narrate(period, &stats).await {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!(period = %period, error = %e, "Narrative unavailable, sending report without it");
                    None
                }
            },
            None => None,
        };

        self.metrics.record_report(period.as_str(), stats.total_score);

        Ok(Report {
            host: self.host.clone(),
            generated_at: end,
            stats,
            narrative,
        })
    }

    /// Generate and deliver to every sink. Returns the report and the
    /// number of sinks that accepted it.
    pub async fn publish(&self, period: ReportPeriod) -> Result<(Report, usize)> {
        let report = match self.generate(period).await {
            Ok(report) => report,
            Err(e) => {
                self.logger.log_report_failure(period.as_str(), &format!("{e:#}"));
                self.set_reporter_health(Some(format!("{e:#}"))).await;
                return Err(e);
            }
        };

        let mut delivered = 0;
        let mut failures = Vec::new();
        for sink in &self.sinks {
            match sink.deliver(&report).await {
                Ok(()) => {
                    debug!(sink = sink.name(), period = %period, "Report delivered");
                    delivered += 1;
                }
                Err(e) => {
                    warn!(sink = sink.name(), period = %period, error = %e, "Report delivery failed");
                    failures.push(format!("{}: {e}", sink.name()));
                }
            }
        }

        self.set_reporter_health((!failures.is_empty()).then(|| failures.join("; ")))
            .await;
        self.logger.log_report(
            period.as_str(),
            report.stats.total_score,
            report.stats.risk_level.as_str(),
            delivered,
        );

        Ok((report, delivered))
    }

    async fn set_reporter_health(&self, failure: Option<String>) {
        let Some(health) = &self.health else {
            return;
        };
        match failure {
            Some(message) => health.set_degraded(components::REPORTER, message).await,
            None => health.set_healthy(components::REPORTER).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ComponentStatus;
    use crate::models::{MetricSample, MetricType, StorageType};
    use crate::store::MetricStore;
    use std::sync::Mutex;

    struct RecordingSink {
        received: Mutex<Vec<Report>>,
        fail: bool,
    }

    impl RecordingSink {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                received: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    #[async_trait]
    impl ReportSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn deliver(&self, report: &Report) -> Result<()> {
            if self.fail {
                anyhow::bail!("transport down");
            }
            self.received.lock().unwrap().push(report.clone());
            Ok(())
        }
    }

    struct FixedNarrator(Option<&'static str>);

    #[async_trait]
    impl Narrator for FixedNarrator {
        async fn narrate(&self, _period: ReportPeriod, _stats: &PeriodStats) -> Result<String> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("model unavailable"))
        }
    }

    fn service() -> ReportService {
        let store = Arc::new(MetricStore::open_in_memory().unwrap());
        let now = Utc::now();
        for i in 1..=5 {
            store
                .save(&MetricSample::at(
                    now - Duration::minutes(i),
                    MetricType::CpuSteal,
                    1.0,
                ))
                .unwrap();
        }
        ReportService::new(RiskAnalyzer::new(store, StorageType::Ssd), "vps-test")
    }

    #[test]
    fn test_period_windows() {
        let end = DateTime::parse_from_rfc3339("2024-03-31T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(ReportPeriod::Daily.window(end).0, end - Duration::days(1));
        assert_eq!(ReportPeriod::Weekly.window(end).0, end - Duration::days(7));

        let month_start = ReportPeriod::Monthly.window(end).0;
        assert_eq!(month_start.to_rfc3339(), "2024-02-29T12:00:00+00:00");
    }

    #[test]
    fn test_period_parse() {
        assert_eq!("weekly".parse::<ReportPeriod>().unwrap(), ReportPeriod::Weekly);
        assert!("yearly".parse::<ReportPeriod>().is_err());
    }

    #[tokio::test]
    async fn test_generate_report() {
        let report = service().generate(ReportPeriod::Daily).await.unwrap();
        assert_eq!(report.host, "vps-test");
        assert_eq!(report.stats.period, "daily");
        assert_eq!(report.stats.cpu_steal_avg, 1.0);
        assert!(report.narrative.is_none());
    }

    #[tokio::test]
    async fn test_narrator_failure_does_not_block() {
        let sink = RecordingSink::new(false);
        let svc = service()
            .with_narrator(Arc::new(FixedNarrator(None)))
            .with_sink(sink.clone());

        let (report, delivered) = svc.publish(ReportPeriod::Daily).await.unwrap();
        assert_eq!(delivered, 1);
        assert!(report.narrative.is_none());
        assert_eq!(sink.received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_narrative_attached_verbatim() {
        let svc = service().with_narrator(Arc::new(FixedNarrator(Some("all quiet"))));
        let report = svc.generate(ReportPeriod::Weekly).await.unwrap();
        assert_eq!(report.narrative.as_deref(), Some("all quiet"));
    }

    #[tokio::test]
    async fn test_failing_sink_degrades_reporter() {
        let health = HealthRegistry::new();
        health.register_all().await;
        let good = RecordingSink::new(false);
        let svc = service()
            .with_sink(RecordingSink::new(true))
            .with_sink(good.clone())
            .with_sink(Arc::new(LogSink))
            .with_health(health.clone());

        let (_, delivered) = svc.publish(ReportPeriod::Daily).await.unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(good.received.lock().unwrap().len(), 1);

        let status = health.health().await.components[components::REPORTER].status;
        assert_eq!(status, ComponentStatus::Degraded);
    }
}
