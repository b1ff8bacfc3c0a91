//! Error handling for the cohort pipeline.

pub mod util;

use std::io;
use std::path::Path;

use arrow::error::ArrowError;
use parquet::errors::ParquetError;

use crate::source::SourceKind;

/// Errors raised while deriving the cohort.
///
/// Structural failures are fatal to the whole run: a partially derived cohort
/// is not usable, so nothing here is recovered locally.
#[derive(Debug, thiserror::Error)]
pub enum CohortError {
    /// A source shard violates the key ordering or lacks an expected column
    #[error("Malformed {table} source in bucket {bucket}: {reason}")]
    MalformedSource {
        bucket: usize,
        table: SourceKind,
        reason: String,
    },

    /// Dictionaries, vocabularies or parameters could not be loaded
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A bucket task panicked or was cancelled by the runtime
    #[error("Worker for bucket {bucket} failed: {reason}")]
    Worker { bucket: usize, reason: String },

    /// The run was stopped before this bucket finished
    #[error("Bucket {bucket} stopped after a failure elsewhere in the run")]
    Cancelled { bucket: usize },

    /// The record queue closed while producers were still sending
    #[error("Record queue closed before all buckets finished")]
    QueueClosed,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl CohortError {
    /// Create a malformed-source error for one shard
    pub fn malformed(bucket: usize, table: SourceKind, reason: impl Into<String>) -> Self {
        Self::MalformedSource {
            bucket,
            table,
            reason: reason.into(),
        }
    }

    /// Create a configuration error that names the offending file
    pub fn config_file(path: &Path, reason: impl std::fmt::Display) -> Self {
        Self::Configuration(format!("{}: {reason}", path.display()))
    }

    /// Whether this error stems from bad input data rather than the environment
    #[must_use]
    pub const fn is_data_error(&self) -> bool {
        matches!(self, Self::MalformedSource { .. })
    }

    /// Whether this error only reports that the run was stopped
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Result type for cohort operations
pub type Result<T> = std::result::Result<T, CohortError>;
