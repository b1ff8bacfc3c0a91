//! Cohort derivation for one bucket
//!
//! A bucket is processed as a single pass over its six sorted sources:
//!
//! 1. [`KeyedMultiJoin`] groups the rows of each subject across the sources
//! 2. [`eligibility_window`] finds the longest run of covered years
//! 3. [`SubjectScanner`] derives onset and baseline indicators
//! 4. [`Sampler`] thins out non-cases
//! 5. [`BucketWorker`] assembles and emits the [`SubjectRecord`]

pub mod context;
pub mod join;
pub mod record;
pub mod sampler;
pub mod scanner;
pub mod window;
pub mod worker;

pub use context::CohortContext;
pub use join::{JoinedSubjectGroup, KeyedMultiJoin, SourceGroup};
pub use record::{SubjectRecord, offset_to_date};
pub use sampler::{Sampler, key_hash};
pub use scanner::{IndicatorSet, ScanResult, SubjectScanner};
pub use window::{CoverageYear, SubjectWindow, coverage_years, eligibility_window};
pub use worker::{BucketStats, BucketWorker, run_bucket};
