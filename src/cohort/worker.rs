//! Processing of one bucket: join, window, scan, sample, emit

use std::ops::AddAssign;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrow::datatypes::{Int32Type, UInt8Type};
use tokio::sync::mpsc;

use super::context::CohortContext;
use super::join::{JoinedSubjectGroup, KeyedMultiJoin};
use super::record::{SubjectRecord, offset_to_date};
use super::sampler::Sampler;
use super::scanner::SubjectScanner;
use super::window::{coverage_years, eligibility_window};
use crate::error::{CohortError, Result};
use crate::source::layout::{BIRTH_YEAR, SEX};
use crate::source::{ChunkReader, SourceKind, SourceProvider};

/// Subjects are logged in steps of this many
pub const LOG_INTERVAL: u64 = 100_000;

/// Per-bucket counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketStats {
    /// Distinct enrollment keys seen
    pub subjects: u64,
    /// Subjects without a window of at least two covered years
    pub ineligible: u64,
    /// Cases whose onset falls inside the baseline period
    pub incident_excluded: u64,
    /// Non-cases removed by the sampler
    pub non_cases_dropped: u64,
    pub cases_emitted: u64,
    pub non_cases_emitted: u64,
}

impl BucketStats {
    #[must_use]
    pub const fn emitted(&self) -> u64 {
        self.cases_emitted + self.non_cases_emitted
    }
}

impl AddAssign for BucketStats {
    fn add_assign(&mut self, other: Self) {
        self.subjects += other.subjects;
        self.ineligible += other.ineligible;
        self.incident_excluded += other.incident_excluded;
        self.non_cases_dropped += other.non_cases_dropped;
        self.cases_emitted += other.cases_emitted;
        self.non_cases_emitted += other.non_cases_emitted;
    }
}

/// Derives the records of one bucket
pub struct BucketWorker<R> {
    bucket: usize,
    join: KeyedMultiJoin<R>,
    scanner: SubjectScanner,
    sampler: Sampler,
    context: Arc<CohortContext>,
    stats: BucketStats,
}

impl<R: ChunkReader> BucketWorker<R> {
    #[must_use]
    pub fn new(bucket: usize, join: KeyedMultiJoin<R>, context: Arc<CohortContext>) -> Self {
        Self {
            bucket,
            join,
            scanner: SubjectScanner::new(context.clone()),
            sampler: Sampler::new(context.study.non_case_modulus),
            context,
            stats: BucketStats::default(),
        }
    }

    /// Open the six sources of `bucket`
    pub fn open<P>(provider: &P, bucket: usize, context: Arc<CohortContext>) -> Result<Self>
    where
        P: SourceProvider<Reader = R>,
    {
        let join = KeyedMultiJoin::open(provider, bucket, &context.dictionary)?;
        Ok(Self::new(bucket, join, context))
    }

    #[must_use]
    pub const fn bucket(&self) -> usize {
        self.bucket
    }

    /// Run the bucket to completion, handing each retained record to `emit`.
    ///
    /// The shutdown flag is checked before every subject; once raised the
    /// worker stops with [`CohortError::Cancelled`].
    pub fn run<F>(mut self, shutdown: &AtomicBool, mut emit: F) -> Result<BucketStats>
    where
        F: FnMut(SubjectRecord) -> Result<()>,
    {
        log::info!("Starting bucket {}", self.bucket);

        loop {
            if shutdown.load(Ordering::Relaxed) {
                return Err(CohortError::Cancelled {
                    bucket: self.bucket,
                });
            }
            let Some(group) = self.join.next_group()? else {
                break;
            };

            if self.stats.subjects % LOG_INTERVAL == 0 {
                log::info!("Bucket {}: {} subjects", self.bucket, self.stats.subjects);
            }
            self.stats.subjects += 1;

            if let Some(record) = self.derive(&group)? {
                emit(record)?;
            }
        }

        log::info!(
            "Finished bucket {}: {} subjects, {} ineligible, {} incident exclusions, \
             {} non-cases dropped, {} cases and {} non-cases emitted",
            self.bucket,
            self.stats.subjects,
            self.stats.ineligible,
            self.stats.incident_excluded,
            self.stats.non_cases_dropped,
            self.stats.cases_emitted,
            self.stats.non_cases_emitted
        );
        Ok(self.stats)
    }

    /// Decide the record of one subject, updating the counters
    pub fn derive(&mut self, group: &JoinedSubjectGroup) -> Result<Option<SubjectRecord>> {
        let study = &self.context.study;
        let enrollment = group.group(SourceKind::Enrollment);

        let Some(window) = eligibility_window(coverage_years(enrollment)?, study.min_coverage_days)
        else {
            self.stats.ineligible += 1;
            return Ok(None);
        };
        let coverage_start = study.year_offset(window.first_year);
        let coverage_end = study.year_offset(window.last_year);

        let scan = self.scanner.scan(group, coverage_start)?;
        if let Some(onset) = scan.heart_failure_date {
            if onset < coverage_start + study.baseline_days {
                if log::log_enabled!(log::Level::Debug) {
                    let day = |offset: i32| {
                        offset_to_date(study.epoch_year, offset)
                            .map_or_else(|| offset.to_string(), |date| date.to_string())
                    };
                    log::debug!(
                        "Bucket {}: subject {} excluded, onset {} within baseline starting {}",
                        self.bucket,
                        group.key(),
                        day(onset),
                        day(coverage_start)
                    );
                }
                self.stats.incident_excluded += 1;
                return Ok(None);
            }
        }

        let is_case = scan.heart_failure_date.is_some();
        if !self.sampler.retain(group.key(), is_case) {
            self.stats.non_cases_dropped += 1;
            return Ok(None);
        }

        let birth_year = enrollment.first_value::<Int32Type>(BIRTH_YEAR)?;
        let sex = enrollment.first_value::<UInt8Type>(SEX)?;
        let (Some(birth_year), Some(sex)) = (birth_year, sex) else {
            return Err(CohortError::malformed(
                self.bucket,
                SourceKind::Enrollment,
                format!("subject {} has no birth year or sex", group.key()),
            ));
        };

        if is_case {
            self.stats.cases_emitted += 1;
        } else {
            self.stats.non_cases_emitted += 1;
        }

        Ok(Some(SubjectRecord {
            hf: is_case,
            hf_date: scan.heart_failure_date,
            coverage_start,
            coverage_end,
            birth_year,
            sex,
            comorbidities: scan.comorbidities,
            drug_groups: scan.drug_groups,
            procedure_groups: scan.procedure_groups,
        }))
    }
}

/// Run one bucket, sending its records into the shared queue.
///
/// Blocks while the queue is full, so it must run outside the async runtime.
pub fn run_bucket<P: SourceProvider>(
    provider: &P,
    bucket: usize,
    context: Arc<CohortContext>,
    shutdown: &AtomicBool,
    sender: &mpsc::Sender<SubjectRecord>,
) -> Result<BucketStats> {
    BucketWorker::open(provider, bucket, context)?.run(shutdown, |record| {
        sender
            .blocking_send(record)
            .map_err(|_| CohortError::QueueClosed)
    })
}
