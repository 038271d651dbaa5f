//! Sample inspection and on-demand collection

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, MetricSample};
use crate::output::{print_info, print_json, print_success, print_table, print_warning, OutputFormat};

/// Row for sample listings
#[derive(Tabled)]
struct SampleRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Type")]
    metric_type: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Details")]
    details: String,
}

/// Payload fields other than the variant tag, as `key=value` pairs
fn payload_details(sample: &MetricSample) -> String {
    let Some(serde_json::Value::Object(fields)) = &sample.extra else {
        return String::new();
    };
    fields
        .iter()
        .filter(|(key, _)| key.as_str() != "kind")
        .map(|(key, value)| match value {
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) if n.is_f64() => format!("{key}={f:.2}"),
                _ => format!("{key}={n}"),
            },
            other => format!("{key}={other}"),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn unit(metric_type: &str) -> &'static str {
    match metric_type {
        "cpu_bench" | "io_latency" | "random_io" => "ms",
        "cpu_load" => "",
        _ => "%",
    }
}

fn to_row(sample: &MetricSample) -> SampleRow {
    SampleRow {
        time: sample.timestamp.clone(),
        metric_type: sample.metric_type.clone(),
        value: format!("{:.2}{}", sample.value, unit(&sample.metric_type)),
        details: payload_details(sample),
    }
}

/// Show the most recent sample of a type
pub async fn show_latest(client: &ApiClient, metric_type: &str, format: OutputFormat) -> Result<()> {
    let sample = client.latest(metric_type).await?;

    match format {
        OutputFormat::Json => print_json(&sample)?,
        OutputFormat::Table => print_table(&[to_row(&sample)]),
    }

    Ok(())
}

/// List samples of a type over the last `hours`
pub async fn list_samples(
    client: &ApiClient,
    metric_type: &str,
    hours: u32,
    format: OutputFormat,
) -> Result<()> {
    let samples = client.samples(metric_type, hours).await?;

    match format {
        OutputFormat::Json => print_json(&samples)?,
        OutputFormat::Table => {
            println!(
                "{} {}",
                format!("{} samples", metric_type).bold(),
                format!("(last {}h)", hours).dimmed()
            );
            let rows: Vec<SampleRow> = samples.iter().map(to_row).collect();
            print_table(&rows);
            if !samples.is_empty() {
                print_info(&format!("{} samples", samples.len()));
            }
        }
    }

    Ok(())
}

/// Run one full collection pass on the agent
pub async fn collect_now(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let summary = client.collect().await?;

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            let total: usize = summary.saved.values().sum();
            print_success(&format!("Saved {} samples", total));
            for (metric_type, count) in &summary.saved {
                println!("  {:<12} {}", metric_type, count);
            }
            for failure in &summary.failures {
                print_warning(&format!("{} failed: {}", failure.probe, failure.error));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(metric_type: &str, extra: Option<serde_json::Value>) -> MetricSample {
        MetricSample {
            id: Some(1),
            timestamp: "2024-06-01T12:00:00Z".into(),
            metric_type: metric_type.into(),
            value: 1.5,
            extra,
        }
    }

    #[test]
    fn test_row_units() {
        assert_eq!(to_row(&sample("io_latency", None)).value, "1.50ms");
        assert_eq!(to_row(&sample("cpu_steal", None)).value, "1.50%");
        assert_eq!(to_row(&sample("cpu_load", None)).value, "1.50");
    }

    #[test]
    fn test_payload_details_skip_tag() {
        let extra = serde_json::json!({
            "kind": "cpu_load",
            "load1": 0.5,
            "num_cpu": 2
        });
        let details = payload_details(&sample("cpu_load", Some(extra)));
        assert_eq!(details, "load1=0.50 num_cpu=2");
    }
}
