//! Configuration for the cohort pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::util::{read_json_file, validate_directory};
use crate::error::{CohortError, Result};
use crate::source::SourceKind;

/// Default number of rows read per chunk from a shard
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// Default capacity of the record queue between workers and the harvester
pub const DEFAULT_QUEUE_CAPACITY: usize = 200;

/// Study constants that define who enters the cohort.
///
/// These are kept as parameters rather than literals so that a change in
/// study design is an explicit configuration change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyParameters {
    /// A year counts as covered with at least this many enrollment days
    pub min_coverage_days: i32,
    /// Length of the baseline period after window start, in days
    pub baseline_days: i32,
    /// Non-cases are kept when `hash(key) % non_case_modulus == 0`
    pub non_case_modulus: u64,
    /// Day offsets are counted from January 1st of this year
    pub epoch_year: i32,
    /// Name of the comorbidity category holding the heart-failure codes
    pub heart_failure_category: String,
    /// Number of drug therapeutic groups (valid group ids are 1..=drug_groups)
    pub drug_groups: usize,
    /// Number of procedure groups (valid group ids are 1..=procedure_groups)
    pub procedure_groups: usize,
}

impl Default for StudyParameters {
    fn default() -> Self {
        Self {
            min_coverage_days: 360,
            baseline_days: 365,
            non_case_modulus: 10,
            epoch_year: 1960,
            heart_failure_category: "CHF".to_string(),
            drug_groups: 31,
            procedure_groups: 500,
        }
    }
}

impl StudyParameters {
    /// Day offset of January 1st of `year`, using the 365.25-day year.
    ///
    /// Offsets beyond the `i32` range saturate.
    #[must_use]
    pub fn year_offset(&self, year: i32) -> i32 {
        (365.25 * (f64::from(year) - f64::from(self.epoch_year))) as i32
    }

    /// Check the parameters for values that would make the study meaningless
    pub fn validate(&self) -> Result<()> {
        if self.non_case_modulus == 0 {
            return Err(CohortError::Configuration(
                "non_case_modulus must be at least 1".to_string(),
            ));
        }
        if self.baseline_days <= 0 {
            return Err(CohortError::Configuration(
                "baseline_days must be positive".to_string(),
            ));
        }
        if self.drug_groups == 0 || self.procedure_groups == 0 {
            return Err(CohortError::Configuration(
                "drug_groups and procedure_groups must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Root directories of the six source tables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceDirs {
    pub enrollment: PathBuf,
    pub outpatient: PathBuf,
    pub services: PathBuf,
    pub inpatient: PathBuf,
    pub facility: PathBuf,
    pub drug: PathBuf,
}

impl SourceDirs {
    /// Get the root directory for a source kind
    #[must_use]
    pub fn get(&self, kind: SourceKind) -> &Path {
        match kind {
            SourceKind::Enrollment => &self.enrollment,
            SourceKind::Outpatient => &self.outpatient,
            SourceKind::Services => &self.services,
            SourceKind::Inpatient => &self.inpatient,
            SourceKind::Facility => &self.facility,
            SourceKind::Drug => &self.drug,
        }
    }

    /// Check that every source root is a readable directory
    pub fn validate(&self) -> Result<()> {
        SourceKind::ALL.into_iter().try_for_each(|kind| {
            validate_directory(self.get(kind), &format!("{} shards", kind.dir_name()))
        })
    }

    /// Lay out all six sources as subdirectories of one base directory
    #[must_use]
    pub fn under(base: &Path) -> Self {
        Self {
            enrollment: base.join(SourceKind::Enrollment.dir_name()),
            outpatient: base.join(SourceKind::Outpatient.dir_name()),
            services: base.join(SourceKind::Services.dir_name()),
            inpatient: base.join(SourceKind::Inpatient.dir_name()),
            facility: base.join(SourceKind::Facility.dir_name()),
            drug: base.join(SourceKind::Drug.dir_name()),
        }
    }
}

/// Configuration for a cohort run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CohortConfig {
    /// Directories holding the per-bucket shards of each source
    pub source_dirs: SourceDirs,
    /// Number of buckets; bucket ids run from 0 to `num_buckets - 1`
    pub num_buckets: usize,
    /// JSON map from diagnosis code strings to integer ids
    pub dictionary_path: PathBuf,
    /// JSON map from category name to ICD-9 codes
    pub icd9_vocabulary_path: PathBuf,
    /// JSON map from category name to ICD-10 codes
    pub icd10_vocabulary_path: PathBuf,
    /// Record log destination; a `.gz` extension enables compression
    pub output_path: PathBuf,
    /// Maximum number of buckets processed at the same time
    pub concurrency: usize,
    /// Capacity of the bounded record queue
    pub queue_capacity: usize,
    /// Rows per chunk read from a shard
    pub chunk_size: usize,
    /// Show a progress bar over buckets
    pub show_progress: bool,
    /// Study design constants
    pub study: StudyParameters,
}

impl Default for CohortConfig {
    fn default() -> Self {
        Self {
            source_dirs: SourceDirs::default(),
            num_buckets: 0,
            dictionary_path: PathBuf::from("dxcodes.json"),
            icd9_vocabulary_path: PathBuf::from("elix9.json"),
            icd10_vocabulary_path: PathBuf::from("elix10.json"),
            output_path: PathBuf::from("hfdat.jsonl.gz"),
            concurrency: num_cpus::get(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            show_progress: true,
            study: StudyParameters::default(),
        }
    }
}

impl CohortConfig {
    /// Create a configuration with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config: Self = read_json_file(path, "cohort configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Set the source directories
    #[must_use]
    pub fn with_source_dirs(mut self, source_dirs: SourceDirs) -> Self {
        self.source_dirs = source_dirs;
        self
    }

    /// Set the number of buckets
    #[must_use]
    pub const fn with_num_buckets(mut self, num_buckets: usize) -> Self {
        self.num_buckets = num_buckets;
        self
    }

    /// Set the concurrency cap
    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the capacity of the record queue
    #[must_use]
    pub const fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Set the rows per chunk
    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the record log destination
    #[must_use]
    pub fn with_output_path(mut self, output_path: impl Into<PathBuf>) -> Self {
        self.output_path = output_path.into();
        self
    }

    /// Set the dictionary and both vocabulary files
    #[must_use]
    pub fn with_code_files(
        mut self,
        dictionary: impl Into<PathBuf>,
        icd9: impl Into<PathBuf>,
        icd10: impl Into<PathBuf>,
    ) -> Self {
        self.dictionary_path = dictionary.into();
        self.icd9_vocabulary_path = icd9.into();
        self.icd10_vocabulary_path = icd10.into();
        self
    }

    /// Enable or disable the progress bar
    #[must_use]
    pub const fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Check that the run can be started with these settings
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(CohortError::Configuration(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(CohortError::Configuration(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(CohortError::Configuration(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        self.study.validate()
    }
}
