//! Job executor.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use sgen_models::{JobId, JobStatus};
use tokio::sync::watch;
use tracing::{error, info, warn, Instrument};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::processor::{process_job, remove_work_dir, ProcessingContext, PROGRESS_RUNNING};

pub const CANCELED_MESSAGE: &str = "canceled by user";

/// Pops job ids and runs them one at a time.
pub struct JobExecutor {
    ctx: Arc<ProcessingContext>,
    shutdown: watch::Sender<bool>,
}

impl JobExecutor {
    pub fn new(ctx: Arc<ProcessingContext>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self { ctx, shutdown }
    }

    pub fn context(&self) -> &Arc<ProcessingContext> {
        &self.ctx
    }

    /// Consume the queue until shutdown or until it is closed and drained.
    ///
    /// A job that has started always reaches a terminal state before the
    /// loop observes shutdown.
    pub async fn run(&self) -> WorkerResult<()> {
        info!("Starting job executor");
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                next = self.ctx.queue.pop() => match next {
                    Some(job_id) => self.execute_job(job_id).await,
                    None => {
                        info!("Job queue closed");
                        break;
                    }
                }
            }
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Signal the run loop to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Run one job to a terminal state.
    pub async fn execute_job(&self, job_id: JobId) {
        let queue = &self.ctx.queue;
        let store = &self.ctx.store;

        if queue.is_canceled(&job_id).await {
            info!(job_id = %job_id, "Skipping canceled job");
            queue.clear(&job_id).await;
            return;
        }

        // The pending check and the transition share one store write so a
        // cancel cannot slip in between them.
        let mut claimed = false;
        let marked = store
            .modify(&job_id, |r| {
                claimed = r.mark_running();
                if claimed {
                    r.set_progress(PROGRESS_RUNNING);
                }
            })
            .await;

        let record = match marked {
            Ok(record) if claimed => record,
            Ok(record) => {
                warn!(job_id = %job_id, status = record.status.as_str(), "Skipping job that is not pending");
                return;
            }
            Err(e) if e.is_not_found() => {
                warn!(job_id = %job_id, "Skipping job missing from store");
                return;
            }
            Err(e) => {
                error!(job_id = %job_id, "Failed to mark job running: {}", e);
                return;
            }
        };

        let logger = JobLogger::new(&job_id, "generate_short");
        let started = Instant::now();

        if queue.is_canceled(&job_id).await {
            info!(job_id = %job_id, "Job canceled before the pipeline started");
            let outcome = Err(WorkerError::job_failed(CANCELED_MESSAGE));
            self.finish(&job_id, outcome, &logger, started).await;
            return;
        }

        let ctx = Arc::clone(&self.ctx);
        let span = logger.create_span();
        let handle = tokio::spawn(async move { process_job(&ctx, &record).await }.instrument(span));

        let outcome = match handle.await {
            Ok(result) => result,
            Err(e) => Err(WorkerError::job_failed(format!("pipeline panicked: {}", e))),
        };

        self.finish(&job_id, outcome, &logger, started).await;
    }

    async fn finish(
        &self,
        job_id: &JobId,
        outcome: WorkerResult<PathBuf>,
        logger: &JobLogger,
        started: Instant,
    ) {
        let queue = &self.ctx.queue;
        let store = &self.ctx.store;

        let canceled = queue.is_canceled(job_id).await;
        let (status, updated) = match &outcome {
            _ if canceled => (
                JobStatus::Canceled,
                store.modify(job_id, |r| r.cancel(CANCELED_MESSAGE)).await,
            ),
            Ok(_) => (JobStatus::Success, store.modify(job_id, |r| r.complete()).await),
            Err(e) => {
                let message = e.job_message();
                logger.log_error(&message);
                (JobStatus::Failed, store.modify(job_id, |r| r.fail(message)).await)
            }
        };

        if let Err(e) = updated {
            warn!(job_id = %job_id, "Could not record terminal state: {}", e);
        }

        if status == JobStatus::Canceled {
            if let Some(record) = store.get(job_id).await {
                if let Err(e) = remove_work_dir(&record.work_dir).await {
                    warn!(job_id = %job_id, "Failed to remove work dir: {}", e);
                }
            }
        }

        queue.clear(job_id).await;

        let elapsed = started.elapsed().as_secs_f64();
        counter!("sgen_jobs_total", "status" => status.as_str()).increment(1);
        histogram!("sgen_job_duration_seconds").record(elapsed);
        logger.log_finished(status, elapsed);
    }
}
