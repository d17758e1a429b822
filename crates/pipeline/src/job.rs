//! One input video through both stages.
//!
//! `Init -> ExtractingFrames -> Encoding -> Done`, with `Failed` reachable from
//! every state. The job's workspace is destroyed before `run` returns on every
//! path; dropping the future mid-stage leaves the cleanup to
//! [`TempWorkspace`]'s `Drop`.

use crate::encode::{
    build_encode_command, build_extract_command, EncodeParams, ExtractParams, FFMPEG_BINARY,
    GIFSKI_BINARY,
};
use crate::paths::{absolutize, PathResolver, ResolveError};
use crate::plan::{ConversionRequest, RequestError};
use crate::supervisor::{
    ExitReason, FileSizeSignal, FrameCountSignal, Launcher, ProcessSupervisor, SettleResult,
    SupervisorTimeouts,
};
use crate::workspace::TempWorkspace;
use gifbatch_config::Config;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// The two external stages of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// ffmpeg: video to PNG frames
    Extract,
    /// gifski: PNG frames to GIF
    Encode,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Encode => "encode",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for a single conversion
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error(transparent)]
    BinaryNotFound(#[from] ResolveError),

    #[error("Failed to create workspace under {}: {source}", root.display())]
    WorkspaceCreation {
        root: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{stage} stage failed to launch: {source}")]
    SpawnFailed {
        stage: Stage,
        #[source]
        source: io::Error,
    },

    #[error("{stage} stage: no output received before startup timeout")]
    StartupTimeout { stage: Stage },

    #[error("{stage} stage was killed")]
    Killed { stage: Stage },

    #[error("{stage} stage exited with code {code}: {output}")]
    NonZeroExit {
        stage: Stage,
        code: i32,
        output: String,
    },

    #[error("No frames were extracted")]
    NoFramesProduced,

    #[error("Output file missing after encoding: {}", path.display())]
    OutputMissing { path: PathBuf },
}

impl JobError {
    /// Stage the error came from, if it came from a supervised process.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            JobError::SpawnFailed { stage, .. }
            | JobError::StartupTimeout { stage }
            | JobError::Killed { stage }
            | JobError::NonZeroExit { stage, .. } => Some(*stage),
            JobError::NoFramesProduced => Some(Stage::Extract),
            JobError::OutputMissing { .. } => Some(Stage::Encode),
            _ => None,
        }
    }
}

/// Job state representing the current stage in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Init,
    ExtractingFrames,
    Encoding,
    Done,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Init => "init",
            JobState::ExtractingFrames => "extracting_frames",
            JobState::Encoding => "encoding",
            JobState::Done => "done",
            JobState::Failed => "failed",
        }
    }
}

/// Converts single requests. Holds no per-job state, so one instance serves a
/// whole batch.
#[derive(Clone)]
pub struct ConversionJob {
    resolver: Arc<PathResolver>,
    launcher: Arc<dyn Launcher>,
    timeouts: SupervisorTimeouts,
    temp_root: PathBuf,
}

impl ConversionJob {
    pub fn new(
        resolver: Arc<PathResolver>,
        launcher: Arc<dyn Launcher>,
        timeouts: SupervisorTimeouts,
        temp_root: PathBuf,
    ) -> Self {
        Self {
            resolver,
            launcher,
            timeouts,
            temp_root,
        }
    }

    /// Build from configuration. The temp root defaults to the system temp dir.
    pub fn from_config(config: &Config, launcher: Arc<dyn Launcher>) -> Self {
        let temp_root = config
            .output
            .temp_root
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        Self::new(
            Arc::new(PathResolver::from_config(&config.binaries)),
            launcher,
            SupervisorTimeouts::from(&config.timeouts),
            temp_root,
        )
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    /// Convert `request.input_path()` into `request.output_path()`.
    pub async fn run(&self, request: &ConversionRequest) -> Result<(), JobError> {
        let started = Instant::now();
        let input = absolutize(request.input_path());
        let output = absolutize(request.output_path());
        info!(input = %input.display(), output = %output.display(), "Job started");

        let result = self.run_inner(request, &input, &output).await;
        match &result {
            Ok(()) => {
                let bytes = std::fs::metadata(&output).map(|m| m.len()).unwrap_or(0);
                info!(
                    input = %input.display(),
                    output = %output.display(),
                    bytes,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    state = JobState::Done.as_str(),
                    "Job finished"
                );
            }
            Err(e) => {
                error!(
                    input = %input.display(),
                    state = JobState::Failed.as_str(),
                    error = %e,
                    "Job failed"
                );
            }
        }
        result
    }

    async fn run_inner(
        &self,
        request: &ConversionRequest,
        input: &Path,
        output: &Path,
    ) -> Result<(), JobError> {
        request.settings().validate()?;
        let ffmpeg = self.resolver.resolve_binary(FFMPEG_BINARY)?;
        let gifski = self.resolver.resolve_binary(GIFSKI_BINARY)?;

        let label = input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut workspace = TempWorkspace::create(&self.temp_root, &label).map_err(|source| {
            JobError::WorkspaceCreation {
                root: self.temp_root.clone(),
                source,
            }
        })?;

        let result = self
            .run_stages(request, input, output, &ffmpeg, &gifski, &workspace)
            .await;
        workspace.destroy();
        result
    }

    async fn run_stages(
        &self,
        request: &ConversionRequest,
        input: &Path,
        output: &Path,
        ffmpeg: &Path,
        gifski: &Path,
        workspace: &TempWorkspace,
    ) -> Result<(), JobError> {
        enter(input, JobState::Init, JobState::ExtractingFrames);
        let extract = build_extract_command(
            ffmpeg.to_path_buf(),
            &ExtractParams {
                input_path: input.to_path_buf(),
                frame_pattern: workspace.frame_pattern(),
                fps: request.fps(),
                width: request.width(),
            },
        );
        let settled = self
            .supervisor(Stage::Extract)
            .run(
                &extract.program,
                &extract.args,
                &FrameCountSignal::new(workspace.path()),
            )
            .await;
        check_settled(Stage::Extract, settled)?;

        let frames = match workspace.list_frames() {
            Ok(frames) => frames,
            Err(e) => {
                warn!(
                    dir = %workspace.path().display(),
                    error = %e,
                    "Workspace unreadable after extraction"
                );
                Vec::new()
            }
        };
        if frames.is_empty() {
            return Err(JobError::NoFramesProduced);
        }
        debug!(input = %input.display(), frames = frames.len(), "Frames extracted");

        enter(input, JobState::ExtractingFrames, JobState::Encoding);
        let encode = build_encode_command(
            gifski.to_path_buf(),
            &EncodeParams {
                fps: request.fps(),
                quality: request.quality(),
                output_path: output.to_path_buf(),
                frames,
            },
        );
        let settled = self
            .supervisor(Stage::Encode)
            .run(&encode.program, &encode.args, &FileSizeSignal::new(output))
            .await;
        check_settled(Stage::Encode, settled)?;

        if !output.exists() {
            return Err(JobError::OutputMissing {
                path: output.to_path_buf(),
            });
        }
        Ok(())
    }

    fn supervisor(&self, stage: Stage) -> ProcessSupervisor {
        ProcessSupervisor::new(self.launcher.clone(), self.timeouts, stage.as_str())
    }
}

fn enter(input: &Path, from: JobState, to: JobState) {
    info!(
        input = %input.display(),
        from = from.as_str(),
        to = to.as_str(),
        "Job state"
    );
}

/// Map a settled stage to the job error taxonomy; returns the final progress value.
fn check_settled(stage: Stage, settled: SettleResult) -> Result<u64, JobError> {
    let SettleResult {
        reason,
        output,
        progress,
        ..
    } = settled;
    match reason {
        ExitReason::Succeeded => Ok(progress),
        ExitReason::NonZeroExit(code) => Err(JobError::NonZeroExit {
            stage,
            code,
            output: output.diagnostic().to_string(),
        }),
        ExitReason::Killed => Err(JobError::Killed { stage }),
        ExitReason::StartupTimeout => Err(JobError::StartupTimeout { stage }),
        ExitReason::SpawnFailed(source) => Err(JobError::SpawnFailed { stage, source }),
    }
}
