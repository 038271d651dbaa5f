//! Error taxonomy for the sampling and persistence layers
//!
//! Probe failures are transient: the caller logs them and the next tick
//! retries. Storage failures are surfaced to the caller untouched.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading a kernel counter source or running a probe.
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {what}: {reason}")]
    Parse { what: &'static str, reason: String },

    #[error("disk probe failed during {stage}: {source}")]
    Io {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to generate random test data: {0}")]
    Random(#[from] rand::Error),
}

impl CollectError {
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(what: &'static str, reason: impl Into<String>) -> Self {
        Self::Parse {
            what,
            reason: reason.into(),
        }
    }

    pub(crate) fn io(stage: &'static str, source: std::io::Error) -> Self {
        Self::Io { stage, source }
    }
}

/// Errors raised by the time-series store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to create storage directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode sample payload: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode payload of sample {id}: {source}")]
    Decode {
        id: i64,
        #[source]
        source: serde_json::Error,
    },

    #[error("sample {id} has a {found} payload but is stored as {expected}")]
    PayloadMismatch {
        id: i64,
        expected: String,
        found: String,
    },

    #[error("unknown metric type '{0}' in store")]
    UnknownMetricType(String),

    #[error("invalid timestamp {0} in store")]
    InvalidTimestamp(i64),

    #[error("store lock poisoned")]
    LockPoisoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_error_messages() {
        let err = CollectError::parse("/proc/stat", "cpu line has 5 fields");
        assert_eq!(
            err.to_string(),
            "failed to parse /proc/stat: cpu line has 5 fields"
        );

        let err = CollectError::read(
            "/proc/meminfo",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/proc/meminfo"));
    }

    #[test]
    fn test_storage_error_messages() {
        let err = StorageError::PayloadMismatch {
            id: 7,
            expected: "memory".to_string(),
            found: "random_io".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "sample 7 has a random_io payload but is stored as memory"
        );
    }
}
