//! Risk report command

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, PeriodStats, Report};
use crate::output::{
    color_risk_level, color_score, color_status, format_ms, format_percent, print_json,
    print_table, OutputFormat,
};

/// Row for the dimension breakdown table
#[derive(Tabled)]
struct DimensionRow {
    #[tabled(rename = "Dimension")]
    dimension: &'static str,
    #[tabled(rename = "Measured")]
    measured: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Weight")]
    weight: &'static str,
    #[tabled(rename = "Finding")]
    finding: String,
}

fn dimension_rows(stats: &PeriodStats) -> Vec<DimensionRow> {
    let s = &stats.scores;
    let finding = |key: &str| stats.risk_details.get(key).cloned().unwrap_or_default();

    vec![
        DimensionRow {
            dimension: "CPU steal",
            measured: format!(
                "avg {} / p95 {}",
                format_percent(stats.cpu_steal_avg),
                format_percent(stats.cpu_steal_p95)
            ),
            score: color_score(s.cpu_steal),
            weight: "35%",
            finding: finding("cpu_steal"),
        },
        DimensionRow {
            dimension: "CPU iowait",
            measured: format!("avg {}", format_percent(stats.cpu_iowait_avg)),
            score: color_score(s.cpu_iowait),
            weight: "10%",
            finding: finding("cpu_iowait"),
        },
        DimensionRow {
            dimension: "CPU stability",
            measured: format!("cv {:.3}", stats.cpu_bench_cv),
            score: color_score(s.cpu_stability),
            weight: "10%",
            finding: finding("cpu_stability"),
        },
        DimensionRow {
            dimension: "Sequential I/O",
            measured: format!("p95 {}", format_ms(stats.io_latency_p95)),
            score: color_score(s.io_latency),
            weight: "15%",
            finding: finding("io_latency"),
        },
        DimensionRow {
            dimension: "Random I/O",
            measured: format!("p95 {}", format_ms(stats.random_io_p95)),
            score: color_score(s.random_io),
            weight: "10%",
            finding: finding("random_io"),
        },
        DimensionRow {
            dimension: "Disk busy",
            measured: format_percent(stats.disk_busy_percent),
            score: color_score(s.disk_busy),
            weight: "5%",
            finding: finding("disk_busy"),
        },
        DimensionRow {
            dimension: "Memory",
            measured: format!("{} available", format_percent(stats.memory_available_percent)),
            score: color_score(s.memory),
            weight: "10%",
            finding: finding("memory"),
        },
        DimensionRow {
            dimension: "Baseline",
            measured: format!(
                "{} {}",
                format_percent(stats.baseline_deviation),
                stats.baseline_status
            ),
            score: color_score(s.baseline),
            weight: "5%",
            finding: finding("baseline"),
        },
    ]
}

/// Busiest hours: up to three with noticeable contention
fn busiest_hours(stats: &PeriodStats) -> Vec<String> {
    let mut hours: Vec<_> = stats
        .hourly
        .iter()
        .filter(|h| h.cpu_steal_avg + h.cpu_iowait_avg > 1.0)
        .collect();
    hours.sort_by(|a, b| {
        (b.cpu_steal_avg + b.cpu_iowait_avg).total_cmp(&(a.cpu_steal_avg + a.cpu_iowait_avg))
    });
    hours
        .into_iter()
        .take(3)
        .map(|h| format!("{:02}:00 UTC", h.hour))
        .collect()
}

/// Show a freshly computed report
pub async fn show_report(client: &ApiClient, period: &str, format: OutputFormat) -> Result<()> {
    let report: Report = client.report(period).await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            let stats = &report.stats;
            println!(
                "{} {}",
                "Oversell Report".bold(),
                format!("({})", stats.period).dimmed()
            );
            println!("{}", "=".repeat(60));
            println!("Host:                   {}", report.host.cyan());
            println!("Window:                 {} .. {}", stats.start, stats.end);
            println!("Storage:                {}", stats.storage_type);
            println!(
                "Score:                  {} ({})",
                color_score(stats.total_score),
                color_risk_level(&stats.risk_level)
            );
            println!(
                "Baseline:               {}",
                color_status(&stats.baseline_status)
            );
            if stats.confidence_boost > 1.0 {
                println!("Confidence boost:       {:.2}x", stats.confidence_boost);
            }
            println!();

            print_table(&dimension_rows(stats));

            if let Some(finding) = stats.risk_details.get("cpu_load") {
                println!("Load:                   {}", finding);
            }
            let busiest = busiest_hours(stats);
            if !busiest.is_empty() {
                println!("Busiest hours:          {}", busiest.join(", "));
            }
            if let Some(at) = &stats.cpu_steal_max_at {
                println!(
                    "Peak steal:             {} at {}",
                    format_percent(stats.cpu_steal_max),
                    at
                );
            }

            if let Some(narrative) = &report.narrative {
                println!();
                println!("{}", "Commentary".bold());
                println!("{}", "-".repeat(60));
                println!("{}", narrative);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{DimensionScores, HourlyStats};
    use std::collections::BTreeMap;

    fn stats() -> PeriodStats {
        PeriodStats {
            period: "daily".into(),
            start: "2024-06-01T00:00:00Z".into(),
            end: "2024-06-02T00:00:00Z".into(),
            storage_type: "SSD".into(),
            cpu_steal_avg: 10.0,
            cpu_steal_max: 12.0,
            cpu_steal_p95: 11.0,
            cpu_steal_max_at: None,
            cpu_iowait_avg: 0.5,
            cpu_iowait_max: 1.0,
            cpu_iowait_p95: 0.9,
            cpu_bench_avg: 20.0,
            cpu_bench_cv: 0.02,
            io_latency_avg: 3.0,
            io_latency_p95: 4.0,
            io_latency_p99: 5.0,
            random_io_write_avg: 0.5,
            random_io_read_avg: 0.2,
            random_io_p95: 0.6,
            disk_busy_percent: 3.0,
            memory_available_percent: 60.0,
            cpu_load_avg: 0.3,
            baseline_deviation: 0.0,
            baseline_status: "stable".into(),
            hourly: vec![
                HourlyStats {
                    hour: 3,
                    cpu_steal_avg: 0.2,
                    cpu_iowait_avg: 0.1,
                    samples: 12,
                },
                HourlyStats {
                    hour: 20,
                    cpu_steal_avg: 14.0,
                    cpu_iowait_avg: 1.0,
                    samples: 12,
                },
                HourlyStats {
                    hour: 21,
                    cpu_steal_avg: 9.0,
                    cpu_iowait_avg: 0.5,
                    samples: 12,
                },
            ],
            confidence_boost: 1.12,
            scores: DimensionScores {
                cpu_steal: 35.7,
                cpu_iowait: 100.0,
                cpu_stability: 100.0,
                io_latency: 100.0,
                random_io: 100.0,
                disk_busy: 100.0,
                memory: 100.0,
                baseline: 100.0,
            },
            total_score: 77.5,
            risk_level: "good".into(),
            risk_details: BTreeMap::from([("cpu_steal".to_string(), "high".to_string())]),
        }
    }

    #[test]
    fn test_dimension_rows_cover_all_weights() {
        let rows = dimension_rows(&stats());
        assert_eq!(rows.len(), 8);
        assert_eq!(rows[0].finding, "high");
        assert!(rows[1].finding.is_empty());

        let total: u32 = rows
            .iter()
            .map(|r| r.weight.trim_end_matches('%').parse::<u32>().unwrap())
            .sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_busiest_hours_ordering() {
        assert_eq!(busiest_hours(&stats()), vec!["20:00 UTC", "21:00 UTC"]);
    }
}
