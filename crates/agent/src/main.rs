//! Oversell Agent - VPS oversell risk monitor
//!
//! Runs on a VPS, samples host contention signals into a local SQLite
//! database and scores the oversell risk of the underlying host.

use anyhow::{Context, Result};
use oversell_lib::{
    analyzer::RiskAnalyzer,
    collector::{CollectionLoop, DiskProbe, ProcPaths, DEFAULT_TEST_DIRS},
    health::HealthRegistry,
    observability::{AgentMetrics, StructuredLogger},
    report::{LogSink, ReportService, ScheduleTracker},
    store::MetricStore,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting oversell-agent");

    // Load configuration
    let config = config::AgentConfig::load()?;
    let schedule = config.schedule()?;
    info!(hostname = %config.hostname, db_path = %config.storage.db_path.display(), "Agent configured");

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let metrics = AgentMetrics::new();
    let logger = StructuredLogger::new(&config.hostname);

    let store = Arc::new(
        MetricStore::open(&config.storage.db_path)
            .with_context(|| format!("Failed to open {}", config.storage.db_path.display()))?,
    );

    let paths = ProcPaths::default();
    let disk = Arc::new(DiskProbe::new(
        &paths,
        config.io_test_size_bytes(),
        &DEFAULT_TEST_DIRS,
    ));

    let probe = disk.clone();
    let analyzer_store = store.clone();
    let analyzer = tokio::task::spawn_blocking(move || RiskAnalyzer::detect(analyzer_store, &probe))
        .await
        .context("Storage detection panicked")?;
    metrics.set_storage_type(&analyzer.storage_type().to_string());

    let reports = ReportService::new(analyzer, config.hostname.clone())
        .with_sink(Arc::new(LogSink))
        .with_health(health_registry.clone());

    let (collection_loop, collect_handle) = CollectionLoop::builder()
        .config(config.collection())
        .paths(paths)
        .store(store.clone())
        .disk_probe(disk.clone())
        .reports(reports.clone(), ScheduleTracker::new(schedule))
        .health(health_registry.clone())
        .host(config.hostname.clone())
        .build()?;

    logger.log_startup(
        AGENT_VERSION,
        &reports.analyzer().storage_type().to_string(),
        &disk.test_dir().display().to_string(),
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Create shared application state
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        store,
        reports,
        collect_handle,
    ));

    let loop_handle = tokio::spawn(collection_loop.run(shutdown_tx.subscribe()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state, shutdown_tx.subscribe()));

    // Mark agent as ready after initialization
    health_registry.set_ready(true).await;

    let reason = wait_for_signal().await?;
    logger.log_shutdown(reason);
    let _ = shutdown_tx.send(());

    if let Err(e) = loop_handle.await {
        error!(error = %e, "Collection loop task failed");
    }
    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server task failed"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_signal() -> Result<&'static str> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for SIGINT")?;
            Ok("SIGINT received")
        }
        _ = sigterm.recv() => Ok("SIGTERM received"),
    }
}
