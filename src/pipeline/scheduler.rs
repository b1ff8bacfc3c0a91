//! Bounded-concurrency dispatch of bucket workers

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rustc_hash::FxHashMap;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;

use crate::cohort::{BucketStats, CohortContext, SubjectRecord, run_bucket};
use crate::error::{CohortError, Result};
use crate::source::SourceProvider;
use crate::utils::logging::{create_main_progress_bar, finish_progress_bar};

/// Runs at most `concurrency` buckets at a time on the blocking pool
pub struct Scheduler<P> {
    provider: Arc<P>,
    context: Arc<CohortContext>,
    concurrency: usize,
    show_progress: bool,
    shutdown: Arc<AtomicBool>,
}

impl<P: SourceProvider + 'static> Scheduler<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, context: Arc<CohortContext>, concurrency: usize) -> Self {
        Self {
            provider,
            context,
            concurrency: concurrency.max(1),
            show_progress: false,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub const fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Process `buckets`, sending records to `sender`.
    ///
    /// The first worker failure raises the shutdown flag: no further bucket
    /// is admitted, running workers stop at their next subject, and the
    /// failure that raised the flag is returned once every task has ended.
    /// A panicked task raises the flag only when it is collected.
    pub async fn run(
        &self,
        buckets: Vec<usize>,
        sender: mpsc::Sender<SubjectRecord>,
    ) -> Result<BucketStats> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let progress = create_main_progress_bar(
            buckets.len() as u64,
            Some("Buckets"),
            self.show_progress,
        );

        let mut tasks = JoinSet::new();
        let mut task_buckets = FxHashMap::default();

        for bucket in buckets {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            if self.shutdown.load(Ordering::Relaxed) {
                log::warn!("Run stopped; bucket {bucket} and later buckets not started");
                break;
            }

            let provider = self.provider.clone();
            let context = self.context.clone();
            let shutdown = self.shutdown.clone();
            let sender = sender.clone();

            let handle = tasks.spawn_blocking(move || {
                let _permit = permit;
                let result = run_bucket(provider.as_ref(), bucket, context, &shutdown, &sender);
                let raised = matches!(&result, Err(e) if !e.is_cancellation())
                    && !shutdown.swap(true, Ordering::SeqCst);
                (bucket, result, raised)
            });
            task_buckets.insert(handle.id(), bucket);
        }
        drop(sender);

        let mut totals = BucketStats::default();
        let mut failures = Failures::default();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(stats), _)) => {
                    totals += stats;
                    progress.inc(1);
                }
                Ok((_, Err(e), _)) if e.is_cancellation() => {}
                Ok((bucket, Err(e), raised)) => {
                    log::error!("Bucket {bucket} failed: {e}");
                    failures.push(e, raised);
                }
                Err(join_error) => {
                    let raised = !self.shutdown.swap(true, Ordering::SeqCst);
                    let bucket = task_buckets.get(&join_error.id()).copied().unwrap_or_default();
                    log::error!("Worker for bucket {bucket} did not complete: {join_error}");
                    failures.push(
                        CohortError::Worker {
                            bucket,
                            reason: join_error.to_string(),
                        },
                        raised,
                    );
                }
            }
        }

        match failures.into_error() {
            Some(e) => {
                progress.abandon_with_message("failed");
                Err(e)
            }
            None => {
                finish_progress_bar(&progress, Some("done"));
                Ok(totals)
            }
        }
    }
}

/// Worker failures of one run
#[derive(Default)]
struct Failures {
    /// The failure that raised the shutdown flag
    origin: Option<CohortError>,
    /// First other failure collected
    first: Option<CohortError>,
}

impl Failures {
    fn push(&mut self, error: CohortError, raised: bool) {
        if raised {
            self.origin = Some(error);
        } else {
            self.first.get_or_insert(error);
        }
    }

    fn into_error(self) -> Option<CohortError> {
        self.origin.or(self.first)
    }
}
