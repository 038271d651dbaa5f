//! Agent library for VPS oversell detection
//!
//! This crate provides the core functionality for:
//! - Host contention sampling (CPU steal/iowait, disk latency, memory)
//! - Time-series persistence in SQLite
//! - Risk scoring over reporting periods
//! - Report scheduling and delivery
//! - Health checks and observability

pub mod analyzer;
pub mod collector;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod report;
pub mod store;

pub use analyzer::RiskAnalyzer;
pub use error::{CollectError, StorageError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
pub use report::{Report, ReportPeriod, ReportService, ReportSink};
pub use store::MetricStore;
