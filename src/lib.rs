//! A Rust library for deriving a heart-failure cohort from sharded,
//! longitudinal claims tables stored as Parquet.
//!
//! Buckets of subjects are processed in parallel under a concurrency cap.
//! Each bucket joins its six sorted source tables by subject key, finds the
//! eligibility window of every subject, scans diagnoses, drugs and procedures,
//! and sends the retained records to a single writer of the record log.

pub mod codes;
pub mod cohort;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod record_log;
pub mod source;
pub mod utils;

// Core types
pub use codes::{CategorySets, CodeDictionary, ComorbidityCategory, DiagnosisId};
pub use config::{CohortConfig, SourceDirs, StudyParameters};
pub use error::{CohortError, Result};

// Cohort derivation
pub use cohort::{
    BucketStats, BucketWorker, CohortContext, JoinedSubjectGroup, KeyedMultiJoin, Sampler,
    SubjectRecord, SubjectScanner, SubjectWindow, eligibility_window,
};

// Sources and output
pub use pipeline::{Pipeline, RunSummary, run_cohort};
pub use record_log::{LogHeader, RecordLogReader, RecordLogWriter, read_record_log};
pub use source::{MemorySourceProvider, ParquetSourceProvider, SourceKind, SourceProvider};

// Arrow types
pub use arrow::record_batch::RecordBatch;
