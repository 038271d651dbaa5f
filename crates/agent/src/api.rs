//! HTTP API for health checks, Prometheus metrics, reports and samples

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use oversell_lib::{
    collector::CollectHandle,
    health::{ComponentStatus, HealthRegistry},
    models::MetricType,
    report::{ReportPeriod, ReportService},
    store::MetricStore,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

const DEFAULT_SAMPLE_HOURS: u32 = 24;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub store: Arc<MetricStore>,
    pub reports: ReportService,
    pub collector: CollectHandle,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        store: Arc<MetricStore>,
        reports: ReportService,
        collector: CollectHandle,
    ) -> Self {
        Self {
            health_registry,
            store,
            reports,
            collector,
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
            "status": status.as_u16()
        }));
        (status, body).into_response()
    }
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    warn!(error = %e, "API request failed");
    ApiError::Internal(e.to_string())
}

fn parse_metric_type(raw: &str) -> Result<MetricType, ApiError> {
    raw.parse::<MetricType>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Result<impl IntoResponse, ApiError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(internal)?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    ))
}

/// Freshly computed report for the window ending now
async fn report(
    State(state): State<Arc<AppState>>,
    Path(period): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let period = period
        .parse::<ReportPeriod>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let report = state
        .reports
        .generate(period)
        .await
        .map_err(|e| internal(format!("{e:#}")))?;
    Ok(Json(report))
}

async fn latest_sample(
    State(state): State<Arc<AppState>>,
    Path(metric_type): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let metric_type = parse_metric_type(&metric_type)?;
    let store = state.store.clone();

    let sample = tokio::task::spawn_blocking(move || store.latest(metric_type))
        .await
        .map_err(internal)?
        .map_err(internal)?
        .ok_or_else(|| ApiError::NotFound(format!("no {metric_type} samples yet")))?;
    Ok(Json(sample))
}

#[derive(Debug, Deserialize)]
struct SamplesQuery {
    hours: Option<u32>,
}

async fn samples(
    State(state): State<Arc<AppState>>,
    Path(metric_type): Path<String>,
    Query(query): Query<SamplesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let metric_type = parse_metric_type(&metric_type)?;
    let hours = query.hours.unwrap_or(DEFAULT_SAMPLE_HOURS);
    if hours == 0 {
        return Err(ApiError::BadRequest("hours must be positive".to_string()));
    }

    let end = Utc::now();
    let start = Duration::try_hours(i64::from(hours))
        .and_then(|window| end.checked_sub_signed(window))
        .ok_or_else(|| ApiError::BadRequest(format!("hours out of range: {hours}")))?;
    let store = state.store.clone();

    let samples = tokio::task::spawn_blocking(move || store.query(metric_type, start, end))
        .await
        .map_err(internal)?
        .map_err(internal)?;
    Ok(Json(samples))
}

/// Run one full collection pass now
async fn collect(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let summary = state
        .collector
        .collect_now()
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;
    Ok(Json(summary))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/report/:period", get(report))
        .route("/api/v1/samples/:metric_type", get(samples))
        .route("/api/v1/samples/:metric_type/latest", get(latest_sample))
        .route("/api/v1/collect", post(collect))
        .with_state(state)
}

/// Start the API server and stop on shutdown
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}
