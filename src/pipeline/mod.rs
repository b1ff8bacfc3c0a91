//! Run-level orchestration
//!
//! Wires the context, record log, harvester and scheduler together. The
//! header is written before the first worker is admitted; the harvester is
//! the only writer of the log.

pub mod harvester;
pub mod scheduler;

use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::cohort::{BucketStats, CohortContext, SubjectRecord};
use crate::config::{CohortConfig, DEFAULT_QUEUE_CAPACITY};
use crate::error::{CohortError, Result};
use crate::record_log::{LogFile, LogHeader, RecordLogWriter, discard_partial};
use crate::source::{ParquetSourceProvider, SourceProvider};
use crate::utils::logging::{log_operation_complete, log_operation_start};

pub use harvester::spawn_harvester;
pub use scheduler::Scheduler;

/// Totals of a finished run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub buckets: usize,
    pub stats: BucketStats,
    pub records_written: u64,
    pub elapsed: Duration,
    /// Final record log location, for runs that wrote a file
    pub output: Option<PathBuf>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} buckets, {} subjects, {} ineligible, {} incident exclusions, \
             {} non-cases dropped, {} cases and {} non-cases written ({} records) in {:?}",
            self.buckets,
            self.stats.subjects,
            self.stats.ineligible,
            self.stats.incident_excluded,
            self.stats.non_cases_dropped,
            self.stats.cases_emitted,
            self.stats.non_cases_emitted,
            self.records_written,
            self.elapsed
        )
    }
}

/// One cohort run over a set of buckets
pub struct Pipeline<P> {
    provider: Arc<P>,
    context: Arc<CohortContext>,
    concurrency: usize,
    queue_capacity: usize,
    show_progress: bool,
}

impl<P: SourceProvider + 'static> Pipeline<P> {
    #[must_use]
    pub fn new(provider: P, context: Arc<CohortContext>) -> Self {
        Self {
            provider: Arc::new(provider),
            context,
            concurrency: num_cpus::get(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            show_progress: false,
        }
    }

    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub const fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    #[must_use]
    pub const fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Derive the records of `buckets` into `writer`.
    ///
    /// Returns the summary and the writer, which holds the complete log. On
    /// failure the log is incomplete and must not be used.
    pub async fn run<W>(
        &self,
        buckets: impl IntoIterator<Item = usize>,
        mut writer: RecordLogWriter<W>,
    ) -> Result<(RunSummary, RecordLogWriter<W>)>
    where
        W: Write + Send + 'static,
    {
        let start = Instant::now();
        let buckets: Vec<usize> = buckets.into_iter().collect();

        writer.write_header(&LogHeader::new(self.context.category_names()))?;

        let (sender, receiver) = mpsc::channel::<SubjectRecord>(self.queue_capacity.max(1));
        let harvester = spawn_harvester(writer, receiver);

        let scheduled = Scheduler::new(self.provider.clone(), self.context.clone(), self.concurrency)
            .with_progress(self.show_progress)
            .run(buckets.clone(), sender)
            .await;
        let harvested = harvester.await?;

        let (stats, writer) = match (scheduled, harvested) {
            (Ok(stats), Ok(writer)) => (stats, writer),
            // A closed queue only reports that the harvester failed first
            (Err(CohortError::QueueClosed), Err(e)) | (Ok(_), Err(e)) => return Err(e),
            (Err(e), _) => return Err(e),
        };

        let summary = RunSummary {
            buckets: buckets.len(),
            stats,
            records_written: writer.records_written(),
            elapsed: start.elapsed(),
            output: None,
        };
        Ok((summary, writer))
    }
}

/// Run the whole cohort derivation described by `config`
pub async fn run_cohort(config: &CohortConfig) -> Result<RunSummary> {
    config.validate()?;
    let context = Arc::new(CohortContext::load(config)?);
    config.source_dirs.validate()?;
    let provider = ParquetSourceProvider::new(config.source_dirs.clone(), config.chunk_size);
    let pipeline = Pipeline::new(provider, context)
        .with_concurrency(config.concurrency)
        .with_queue_capacity(config.queue_capacity)
        .with_progress(config.show_progress);

    log_operation_start("Writing record log to", &config.output_path);
    let writer = RecordLogWriter::new(LogFile::create(&config.output_path)?);

    let (mut summary, writer) = match pipeline.run(0..config.num_buckets, writer).await {
        Ok(done) => done,
        Err(e) => {
            discard_partial(&config.output_path);
            return Err(e);
        }
    };

    let committed = writer.finish().and_then(LogFile::commit);
    match committed {
        Ok(path) => summary.output = Some(path),
        Err(e) => {
            discard_partial(&config.output_path);
            return Err(e);
        }
    }

    log_operation_complete(
        "wrote",
        &config.output_path,
        summary.records_written,
        Some(summary.elapsed),
    );
    log::info!("Cohort run complete: {summary}");
    Ok(summary)
}
