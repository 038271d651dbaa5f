//! API client for communicating with the oversell agent

use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// API client for the agent's HTTP API
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            // a full collection pass runs the disk tests
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response, false).await
    }

    /// Make a POST request without a body
    pub async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response, false).await
    }

    /// GET a probe endpoint whose 503 body is still meaningful
    async fn get_probe<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response, true).await
    }

    async fn decode<T: DeserializeOwned>(response: Response, accept_unavailable: bool) -> Result<T> {
        let status = response.status();
        let accepted =
            status.is_success() || (accept_unavailable && status == StatusCode::SERVICE_UNAVAILABLE);

        if !accepted {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn report(&self, period: &str) -> Result<Report> {
        self.get(&format!("api/v1/report/{period}")).await
    }

    pub async fn latest(&self, metric_type: &str) -> Result<MetricSample> {
        self.get(&format!("api/v1/samples/{metric_type}/latest"))
            .await
    }

    pub async fn samples(&self, metric_type: &str, hours: u32) -> Result<Vec<MetricSample>> {
        self.get(&format!("api/v1/samples/{metric_type}?hours={hours}"))
            .await
    }

    pub async fn collect(&self) -> Result<CollectSummary> {
        self.post("api/v1/collect").await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get_probe("healthz").await
    }

    pub async fn readiness(&self) -> Result<ReadinessResponse> {
        self.get_probe("readyz").await
    }
}

// API response types

#[derive(Debug, Clone, Deserialize)]
struct ApiErrorBody {
    error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub host: String,
    pub generated_at: String,
    pub stats: PeriodStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodStats {
    pub period: String,
    pub start: String,
    pub end: String,
    pub storage_type: String,
    pub cpu_steal_avg: f64,
    pub cpu_steal_max: f64,
    pub cpu_steal_p95: f64,
    #[serde(default)]
    pub cpu_steal_max_at: Option<String>,
    pub cpu_iowait_avg: f64,
    pub cpu_iowait_max: f64,
    pub cpu_iowait_p95: f64,
    pub cpu_bench_avg: f64,
    pub cpu_bench_cv: f64,
    pub io_latency_avg: f64,
    pub io_latency_p95: f64,
    pub io_latency_p99: f64,
    pub random_io_write_avg: f64,
    pub random_io_read_avg: f64,
    pub random_io_p95: f64,
    pub disk_busy_percent: f64,
    pub memory_available_percent: f64,
    pub cpu_load_avg: f64,
    pub baseline_deviation: f64,
    pub baseline_status: String,
    #[serde(default)]
    pub hourly: Vec<HourlyStats>,
    pub confidence_boost: f64,
    pub scores: DimensionScores,
    pub total_score: f64,
    pub risk_level: String,
    #[serde(default)]
    pub risk_details: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyStats {
    pub hour: u32,
    pub cpu_steal_avg: f64,
    pub cpu_iowait_avg: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionScores {
    pub cpu_steal: f64,
    pub cpu_iowait: f64,
    pub cpu_stability: f64,
    pub io_latency: f64,
    pub random_io: f64,
    pub disk_busy: f64,
    pub memory: f64,
    pub baseline: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    #[serde(default)]
    pub id: Option<i64>,
    pub timestamp: String,
    pub metric_type: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeFailure {
    pub probe: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectSummary {
    pub saved: BTreeMap<String, usize>,
    pub failures: Vec<ProbeFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
