//! Entry point for callers: batch conversion plus the path checks a front end
//! needs to expand dropped files and folders.

use crate::batch::{BatchError, BatchRunner};
use crate::job::ConversionJob;
use crate::plan::{BatchPlan, BatchResult, EncodeSettings, RequestError};
use crate::progress::ProgressEvent;
use crate::scan::{self, PathKind};
use crate::startup::{run_startup_checks, StartupError, StartupReport};
use crate::supervisor::{Launcher, SystemLauncher};
use gifbatch_config::Config;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Batch converter. One batch runs at a time per instance.
pub struct Converter {
    config: Config,
    runner: BatchRunner,
    cancel: Mutex<CancellationToken>,
}

impl Converter {
    /// Converter launching real processes.
    pub fn new(config: Config) -> Self {
        Self::with_launcher(config, Arc::new(SystemLauncher))
    }

    /// Converter using a custom [`Launcher`].
    pub fn with_launcher(config: Config, launcher: Arc<dyn Launcher>) -> Self {
        let runner = BatchRunner::new(ConversionJob::from_config(&config, launcher));
        Self::with_runner(config, runner)
    }

    /// Converter around a preassembled runner.
    pub fn with_runner(config: Config, runner: BatchRunner) -> Self {
        Self {
            config,
            runner,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Send a [`ProgressEvent`] to `sender` before each job.
    pub fn with_progress(mut self, sender: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        self.runner = self.runner.with_progress(sender);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Plan `inputs` with the configured encoding defaults and folder name.
    pub fn plan_from_inputs<I, P>(
        &self,
        inputs: I,
        output_dir: Option<&Path>,
    ) -> Result<BatchPlan, RequestError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        BatchPlan::from_inputs(
            inputs,
            output_dir,
            EncodeSettings::from(&self.config.encoding),
            &self.config.output.folder_name,
        )
    }

    /// Run `plan`. Any earlier cancellation request is discarded first.
    pub async fn run_batch(&self, plan: &BatchPlan) -> Result<BatchResult, BatchError> {
        let token = CancellationToken::new();
        *self.lock_cancel() = token.clone();
        self.runner.run(plan, &token).await
    }

    /// Ask the running batch to stop before its next job. Idempotent.
    pub fn request_cancel(&self) {
        let token = self.lock_cancel();
        if !token.is_cancelled() {
            info!("Cancellation requested");
            token.cancel();
        }
    }

    pub fn check_exists(&self, path: &Path) -> PathKind {
        scan::check_exists(path)
    }

    pub fn list_video_files(&self, folder: &Path) -> Vec<PathBuf> {
        scan::list_video_files(folder)
    }

    /// Resolve and smoke-test the configured binaries.
    pub async fn startup_checks(&self) -> Result<StartupReport, StartupError> {
        run_startup_checks(&crate::paths::PathResolver::from_config(&self.config.binaries)).await
    }

    fn lock_cancel(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        // The token stays valid even if a holder panicked
        self.cancel.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
