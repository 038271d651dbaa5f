//! SQLite schema for the sample log.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    metric_type TEXT NOT NULL,
    value REAL NOT NULL,
    extra BLOB
);

CREATE INDEX IF NOT EXISTS idx_metrics_time
    ON metrics(timestamp);

CREATE INDEX IF NOT EXISTS idx_metrics_type_time
    ON metrics(metric_type, timestamp);
"#;
