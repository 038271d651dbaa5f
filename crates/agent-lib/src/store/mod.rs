//! Append-only time-series store backed by SQLite.
//!
//! Every row holds one typed sample. Payloads are written as opaque JSON
//! bytes and only decoded on the way out, where the variant is checked
//! against the row's metric type.

use crate::error::StorageError;
use crate::models::{MetricSample, MetricType, SamplePayload};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

mod schema;

/// SQLite-backed sample store.
///
/// A single connection behind a mutex serializes writers; each query runs
/// as one statement and so sees a consistent snapshot.
pub struct MetricStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl MetricStore {
    /// Open (or create) a file-backed store.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Directory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(path.to_path_buf()),
        };
        store.run_migrations()?;
        debug!(path = %path.display(), "metric store opened");
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn run_migrations(&self) -> Result<(), StorageError> {
        self.lock()?.execute_batch(schema::SCHEMA)?;
        Ok(())
    }

    /// Append a sample. A payload whose variant belongs to another metric
    /// type is rejected before anything is written.
    pub fn save(&self, sample: &MetricSample) -> Result<(), StorageError> {
        let extra = match &sample.extra {
            Some(payload) => {
                check_payload(0, sample.metric_type, payload)?;
                Some(serde_json::to_vec(payload).map_err(StorageError::Encode)?)
            }
            None => None,
        };

        self.lock()?.execute(
            "INSERT INTO metrics (timestamp, metric_type, value, extra) VALUES (?1, ?2, ?3, ?4)",
            params![
                sample.timestamp.timestamp(),
                sample.metric_type.as_str(),
                sample.value,
                extra,
            ],
        )?;
        Ok(())
    }

    /// Samples of one type with `start <= timestamp <= end`, oldest first.
    /// Ties keep insertion order.
    pub fn query(
        &self,
        metric_type: MetricType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MetricSample>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, timestamp, metric_type, value, extra FROM metrics
             WHERE metric_type = ?1 AND timestamp >= ?2 AND timestamp <= ?3
             ORDER BY timestamp ASC, id ASC",
        )?;

        let rows = stmt.query_map(
            params![metric_type.as_str(), start.timestamp(), end.timestamp()],
            RawRow::from_row,
        )?;

        let mut samples = Vec::new();
        for row in rows {
            samples.push(row?.decode()?);
        }
        Ok(samples)
    }

    /// Most recent sample of a type, `None` when the type has no rows.
    pub fn latest(&self, metric_type: MetricType) -> Result<Option<MetricSample>, StorageError> {
        let raw = self
            .lock()?
            .query_row(
                "SELECT id, timestamp, metric_type, value, extra FROM metrics
                 WHERE metric_type = ?1
                 ORDER BY timestamp DESC, id DESC LIMIT 1",
                params![metric_type.as_str()],
                RawRow::from_row,
            )
            .optional()?;

        raw.map(RawRow::decode).transpose()
    }

    /// Delete rows older than `retention_days` days. Returns rows removed.
    ///
    /// A window reaching past the representable range deletes nothing.
    pub fn cleanup(&self, retention_days: u32) -> Result<usize, StorageError> {
        let cutoff = ChronoDuration::try_days(i64::from(retention_days))
            .and_then(|window| Utc::now().checked_sub_signed(window));
        match cutoff {
            Some(cutoff) => self.cleanup_before(cutoff),
            None => Ok(0),
        }
    }

    /// Delete rows strictly older than `cutoff` in a single statement.
    pub fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let deleted = self.lock()?.execute(
            "DELETE FROM metrics WHERE timestamp < ?1",
            params![cutoff.timestamp()],
        )?;
        debug!(deleted, cutoff = %cutoff, "pruned old samples");
        Ok(deleted)
    }

    /// Row count per type, for status output.
    pub fn count(&self, metric_type: MetricType) -> Result<u64, StorageError> {
        let count: i64 = self.lock()?.query_row(
            "SELECT COUNT(*) FROM metrics WHERE metric_type = ?1",
            params![metric_type.as_str()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

/// Undecoded row, read inside the lock and decoded outside the statement
struct RawRow {
    id: i64,
    timestamp: i64,
    metric_type: String,
    value: f64,
    extra: Option<Vec<u8>>,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            metric_type: row.get(2)?,
            value: row.get(3)?,
            extra: row.get(4)?,
        })
    }

    fn decode(self) -> Result<MetricSample, StorageError> {
        let metric_type: MetricType = self
            .metric_type
            .parse()
            .map_err(|_| StorageError::UnknownMetricType(self.metric_type.clone()))?;
        let timestamp = DateTime::from_timestamp(self.timestamp, 0)
            .ok_or(StorageError::InvalidTimestamp(self.timestamp))?;

        let extra = match self.extra {
            Some(bytes) => {
                let payload: SamplePayload = serde_json::from_slice(&bytes)
                    .map_err(|source| StorageError::Decode { id: self.id, source })?;
                check_payload(self.id, metric_type, &payload)?;
                Some(payload)
            }
            None => None,
        };

        Ok(MetricSample {
            id: Some(self.id),
            timestamp,
            metric_type,
            value: self.value,
            extra,
        })
    }
}

fn check_payload(
    id: i64,
    metric_type: MetricType,
    payload: &SamplePayload,
) -> Result<(), StorageError> {
    let found = payload.metric_type();
    if found != metric_type {
        return Err(StorageError::PayloadMismatch {
            id,
            expected: metric_type.to_string(),
            found: found.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_query_is_inclusive_and_ascending() {
        let store = MetricStore::open_in_memory().unwrap();
        for (offset, value) in [(30, 3.0), (10, 1.0), (20, 2.0), (40, 4.0)] {
            store
                .save(&MetricSample::at(ts(offset), MetricType::CpuSteal, value))
                .unwrap();
        }
        store
            .save(&MetricSample::at(ts(20), MetricType::CpuIowait, 9.0))
            .unwrap();

        let samples = store.query(MetricType::CpuSteal, ts(10), ts(30)).unwrap();
        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
        assert!(samples.iter().all(|s| s.id.is_some()));
    }

    #[test]
    fn test_query_ties_keep_insertion_order() {
        let store = MetricStore::open_in_memory().unwrap();
        for value in [5.0, 1.0, 3.0] {
            store
                .save(&MetricSample::at(ts(0), MetricType::IoLatency, value))
                .unwrap();
        }
        let values: Vec<f64> = store
            .query(MetricType::IoLatency, ts(0), ts(0))
            .unwrap()
            .iter()
            .map(|s| s.value)
            .collect();
        assert_eq!(values, vec![5.0, 1.0, 3.0]);
    }

    #[test]
    fn test_query_empty() {
        let store = MetricStore::open_in_memory().unwrap();
        assert!(store
            .query(MetricType::Memory, ts(0), ts(100))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_payload_survives_storage() {
        let store = MetricStore::open_in_memory().unwrap();
        let payload = SamplePayload::RandomIo {
            write_latency_ms: 1.25,
            read_latency_ms: 0.5,
            used_direct_io: true,
        };
        store
            .save(&MetricSample::at(ts(5), MetricType::RandomIo, 1.25).with_payload(payload.clone()))
            .unwrap();

        let samples = store.query(MetricType::RandomIo, ts(0), ts(10)).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].extra, Some(payload));
        assert_eq!(samples[0].timestamp, ts(5));
    }

    #[test]
    fn test_save_rejects_mismatched_payload() {
        let store = MetricStore::open_in_memory().unwrap();
        let sample = MetricSample::at(ts(0), MetricType::Memory, 50.0).with_payload(
            SamplePayload::CpuLoad {
                load1: 1.0,
                load5: 1.0,
                load15: 1.0,
                num_cpu: 2,
            },
        );
        let err = store.save(&sample).unwrap_err();
        assert!(matches!(err, StorageError::PayloadMismatch { .. }));
        assert_eq!(store.count(MetricType::Memory).unwrap(), 0);
    }

    #[test]
    fn test_read_rejects_mismatched_payload() {
        let store = MetricStore::open_in_memory().unwrap();
        let bytes = serde_json::to_vec(&SamplePayload::SequentialIo {
            write_ms: 1.0,
            sync_ms: 2.0,
        })
        .unwrap();
        store
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO metrics (timestamp, metric_type, value, extra) VALUES (?1, 'memory', 1.0, ?2)",
                params![ts(0).timestamp(), bytes],
            )
            .unwrap();

        let err = store.query(MetricType::Memory, ts(0), ts(0)).unwrap_err();
        assert!(matches!(err, StorageError::PayloadMismatch { .. }));
    }

    #[test]
    fn test_read_rejects_corrupt_payload() {
        let store = MetricStore::open_in_memory().unwrap();
        store
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO metrics (timestamp, metric_type, value, extra) VALUES (?1, 'memory', 1.0, x'7b7b')",
                params![ts(0).timestamp()],
            )
            .unwrap();
        let err = store.latest(MetricType::Memory).unwrap_err();
        assert!(matches!(err, StorageError::Decode { .. }));
    }

    #[test]
    fn test_latest() {
        let store = MetricStore::open_in_memory().unwrap();
        assert!(store.latest(MetricType::CpuBench).unwrap().is_none());

        store
            .save(&MetricSample::at(ts(10), MetricType::CpuBench, 12.0))
            .unwrap();
        store
            .save(&MetricSample::at(ts(20), MetricType::CpuBench, 15.0))
            .unwrap();
        store
            .save(&MetricSample::at(ts(5), MetricType::CpuBench, 9.0))
            .unwrap();

        let latest = store.latest(MetricType::CpuBench).unwrap().unwrap();
        assert_eq!(latest.value, 15.0);
    }

    #[test]
    fn test_cleanup_is_strict_and_idempotent() {
        let store = MetricStore::open_in_memory().unwrap();
        let now = Utc::now();
        store
            .save(&MetricSample::at(now - ChronoDuration::days(40), MetricType::CpuSteal, 1.0))
            .unwrap();
        store
            .save(&MetricSample::at(now - ChronoDuration::days(31), MetricType::Memory, 1.0))
            .unwrap();
        store
            .save(&MetricSample::at(now - ChronoDuration::days(1), MetricType::CpuSteal, 1.0))
            .unwrap();

        assert_eq!(store.cleanup(30).unwrap(), 2);
        assert_eq!(store.cleanup(30).unwrap(), 0);
        assert_eq!(store.count(MetricType::CpuSteal).unwrap(), 1);
    }

    #[test]
    fn test_cleanup_with_huge_retention_keeps_everything() {
        let store = MetricStore::open_in_memory().unwrap();
        store
            .save(&MetricSample::at(ts(100), MetricType::CpuSteal, 1.0))
            .unwrap();

        assert_eq!(store.cleanup(u32::MAX).unwrap(), 0);
        assert_eq!(store.count(MetricType::CpuSteal).unwrap(), 1);
    }

    #[test]
    fn test_cleanup_before_keeps_boundary_row() {
        let store = MetricStore::open_in_memory().unwrap();
        store
            .save(&MetricSample::at(ts(100), MetricType::CpuLoad, 0.5))
            .unwrap();
        assert_eq!(store.cleanup_before(ts(100)).unwrap(), 0);
        assert_eq!(store.cleanup_before(ts(101)).unwrap(), 1);
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("metrics.db");
        let store = MetricStore::open(&path).unwrap();
        store
            .save(&MetricSample::at(ts(0), MetricType::CpuSteal, 1.0))
            .unwrap();
        drop(store);

        let reopened = MetricStore::open(&path).unwrap();
        assert_eq!(reopened.count(MetricType::CpuSteal).unwrap(), 1);
        assert_eq!(reopened.db_path(), Some(path.as_path()));
    }
}
