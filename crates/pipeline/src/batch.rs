//! Sequential execution of a batch plan.
//!
//! Jobs run one at a time in plan order. Cancellation is checked only between
//! jobs, so a job that has started always runs to completion. The first failed
//! job aborts the batch.

use crate::job::{ConversionJob, JobError};
use crate::plan::{BatchPlan, BatchResult, JobOutcome};
use crate::progress::ProgressEvent;
use crate::skip::should_skip;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Error type for batch operations
#[derive(Debug, Error)]
pub enum BatchError {
    /// A job failed; the batch stopped after it.
    #[error("Job {index} ({}) failed: {source}", input.display())]
    Job {
        /// 1-based position in the plan
        index: usize,
        input: PathBuf,
        #[source]
        source: JobError,
    },

    /// A job's output folder could not be created.
    #[error("Failed to create output folder {}: {source}", path.display())]
    OutputFolder {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Runs every request of a plan through a [`ConversionJob`].
#[derive(Clone)]
pub struct BatchRunner {
    job: ConversionJob,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl BatchRunner {
    pub fn new(job: ConversionJob) -> Self {
        Self {
            job,
            progress: None,
        }
    }

    /// Emit a [`ProgressEvent`] on `sender` before each job.
    pub fn with_progress(mut self, sender: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Run `plan` to completion, cancellation, or the first failure.
    pub async fn run(
        &self,
        plan: &BatchPlan,
        cancel: &CancellationToken,
    ) -> Result<BatchResult, BatchError> {
        let started = Instant::now();
        let total = plan.len();
        let mut result = BatchResult::default();
        info!(total, "Batch started");

        for folder in plan.output_folders() {
            if let Err(e) = std::fs::create_dir_all(&folder) {
                warn!(folder = %folder.display(), error = %e, "Failed to create output folder");
            }
        }

        for (i, request) in plan.iter().enumerate() {
            let index = i + 1;
            if cancel.is_cancelled() {
                info!(index, total, "Batch cancelled");
                result.finish(started.elapsed(), true);
                return Ok(result);
            }

            self.emit(ProgressEvent {
                current: index,
                total,
                filename: request.display_name(),
            });

            if should_skip(request.output_path()) {
                info!(
                    index,
                    output = %request.output_path().display(),
                    "Skipping, output already exists"
                );
                result.record(&JobOutcome::Skipped);
                continue;
            }

            let folder = request.output_folder();
            if let Err(source) = std::fs::create_dir_all(folder) {
                error!(folder = %folder.display(), error = %source, "Output folder unavailable");
                return Err(BatchError::OutputFolder {
                    path: folder.to_path_buf(),
                    source,
                });
            }

            match self.job.run(request).await {
                Ok(()) => result.record(&JobOutcome::Converted),
                Err(source) => {
                    let outcome = JobOutcome::Failed(source.to_string());
                    result.record(&outcome);
                    error!(
                        index,
                        total,
                        input = %request.input_path().display(),
                        outcome = outcome.as_str(),
                        converted = result.converted,
                        skipped = result.skipped,
                        "Batch aborted"
                    );
                    return Err(BatchError::Job {
                        index,
                        input: request.input_path().to_path_buf(),
                        source,
                    });
                }
            }
        }

        result.finish(started.elapsed(), false);
        info!(
            converted = result.converted,
            skipped = result.skipped,
            elapsed_secs = result.total_elapsed_secs,
            "Batch finished"
        );
        Ok(result)
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.progress {
            if tx.send(event).is_err() {
                debug!("Progress receiver dropped");
            }
        }
    }
}
