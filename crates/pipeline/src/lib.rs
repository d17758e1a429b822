//! gifbatch
//!
//! Batch video-to-GIF conversion. Each input is decoded to PNG frames by
//! ffmpeg in a private temp workspace, then encoded by gifski, with both
//! processes run under a supervisor that enforces a startup timeout and
//! reports stalls.

pub mod batch;
pub mod converter;
pub mod encode;
pub mod job;
pub mod paths;
pub mod plan;
pub mod progress;
pub mod scan;
pub mod skip;
pub mod startup;
pub mod supervisor;
pub mod workspace;

pub use gifbatch_config as config;
pub use gifbatch_config::Config;

pub use batch::{BatchError, BatchRunner};
pub use converter::Converter;
pub use encode::{
    build_encode_command, build_extract_command, EncodeParams, ExtractParams, StageCommand,
};
pub use job::{ConversionJob, JobError, JobState, Stage};
pub use paths::{absolutize, normalize_path, PathResolver, Platform, ResolveError};
pub use plan::{
    BatchPlan, BatchResult, ConversionRequest, EncodeSettings, JobOutcome, RequestError,
};
pub use progress::{estimate_remaining, format_eta, ProgressEvent};
pub use scan::{check_exists, is_video_file, list_video_files, PathKind, VIDEO_EXTENSIONS};
pub use skip::should_skip;
pub use startup::{
    check_binary_runs, parse_ffmpeg_version, run_startup_checks, StartupError, StartupReport,
};
pub use supervisor::{
    ExitReason, FileSizeSignal, FrameCountSignal, Launcher, ProcessSupervisor, ProgressSignal,
    SettleResult, SupervisorState, SupervisorTimeouts, SystemLauncher,
};
pub use workspace::{remove_tree_best_effort, TempWorkspace};
